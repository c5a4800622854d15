//! `LocalFileLocker`: mutual exclusion through marker files alone.

use super::markers::{Markers, PidMarker, remove_marker};
use super::metadata::MarkerMetadata;
use crate::error::{ExecLockError, Result};
use crate::fs::{atomic_write, create_exclusive};
use crate::liveness::{LivenessOracle, OsLiveness, local_host};
use crate::locker::poll::{Poll, block_until_granted};
use crate::locker::{Locker, validate_resource};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing knobs of the local strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSettings {
    /// Delay between two poll ticks.
    pub poll_interval: Duration,

    /// Sweep dead markers every N ticks (tick 0 always sweeps).
    pub sweep_every_ticks: u32,

    /// Pause after `unlock()` before the handle may be reused.
    pub unlock_cooldown: Duration,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            sweep_every_ticks: 12,
            unlock_cooldown: Duration::from_secs(10),
        }
    }
}

/// Filesystem-only locker for one resource.
///
/// Participants register a PID marker, wait until no lock marker exists,
/// and then the oldest live PID marker claims the lock marker with an
/// exclusive create. A holder that dies is detected by the periodic sweep,
/// which deletes its lock marker and re-opens the election.
///
/// One handle per resource per process: markers are keyed by pid.
pub struct LocalFileLocker<O: LivenessOracle + 'static = OsLiveness> {
    participant: Participant<O>,
    settings: LocalSettings,
    holding: bool,
}

/// Everything the poll thread needs, cloned into it.
struct Participant<O: LivenessOracle> {
    markers: Markers,
    resource: String,
    oracle: Arc<O>,
    pid: u32,
    host: String,
    sweep_every_ticks: u32,
    tick: u64,
}

impl<O: LivenessOracle> Clone for Participant<O> {
    fn clone(&self) -> Self {
        Self {
            markers: self.markers.clone(),
            resource: self.resource.clone(),
            oracle: Arc::clone(&self.oracle),
            pid: self.pid,
            host: self.host.clone(),
            sweep_every_ticks: self.sweep_every_ticks,
            tick: 0,
        }
    }
}

impl LocalFileLocker<OsLiveness> {
    /// Create a locker for `resource` in the shared directory `dir`.
    pub fn new(dir: impl Into<PathBuf>, resource: &str) -> Result<Self> {
        validate_resource(resource)?;
        let settings = LocalSettings::default();
        Ok(Self {
            participant: Participant {
                markers: Markers::new(dir, resource),
                resource: resource.to_string(),
                oracle: Arc::new(OsLiveness),
                pid: std::process::id(),
                host: local_host(),
                sweep_every_ticks: settings.sweep_every_ticks,
                tick: 0,
            },
            settings,
            holding: false,
        })
    }
}

impl<O: LivenessOracle + 'static> LocalFileLocker<O> {
    pub fn with_settings(mut self, settings: LocalSettings) -> Self {
        self.participant.sweep_every_ticks = settings.sweep_every_ticks.max(1);
        self.settings = settings;
        self
    }

    /// Replace the liveness oracle.
    pub fn with_oracle<P: LivenessOracle + 'static>(self, oracle: P) -> LocalFileLocker<P> {
        let Participant {
            markers,
            resource,
            pid,
            host,
            sweep_every_ticks,
            ..
        } = self.participant;
        LocalFileLocker {
            participant: Participant {
                markers,
                resource,
                oracle: Arc::new(oracle),
                pid,
                host,
                sweep_every_ticks,
                tick: 0,
            },
            settings: self.settings,
            holding: self.holding,
        }
    }

    /// Act as process `pid` instead of the current process.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.participant.pid = pid;
        self
    }

    pub fn pid(&self) -> u32 {
        self.participant.pid
    }

    pub fn dir(&self) -> &std::path::Path {
        self.participant.markers.dir()
    }
}

impl<O: LivenessOracle> Participant<O> {
    /// Whether the pid recorded on `host` is known to be dead.
    ///
    /// Markers without readable metadata are assumed to be from this host.
    fn is_dead(&self, pid: u32, host: Option<&str>) -> bool {
        let local = host.is_none_or(|h| h == self.host);
        local && !self.oracle.is_alive(pid)
    }

    fn marker_host(path: &std::path::Path) -> Option<String> {
        MarkerMetadata::from_file(path).ok().map(|m| m.host)
    }

    /// Delete markers of dead pids, and the lock marker if its owner is dead.
    fn sweep(&self) -> Result<()> {
        for marker in self.markers.pid_markers()? {
            let host = Self::marker_host(&marker.path);
            if self.is_dead(marker.pid, host.as_deref()) {
                info!(
                    resource = %self.resource,
                    pid = marker.pid,
                    "removing marker of dead participant"
                );
                remove_marker(&marker.path);
            }
        }

        for pid in self.markers.pidlock_owners()? {
            let path = self.markers.pidlock_path(pid);
            let host = Self::marker_host(&path);
            if self.is_dead(pid, host.as_deref()) {
                remove_marker(&path);
            }
        }

        if !self.markers.lock_exists() {
            return Ok(());
        }

        let holder_dead = match self.markers.lock_owner() {
            Ok(Some(owner)) => self.is_dead(owner.pid, Some(&owner.host)),
            Ok(None) => false,
            Err(e) => {
                // Unreadable lock marker: fall back to the PID-lock markers.
                debug!(resource = %self.resource, error = %e, "lock marker unreadable");
                let owners = self.markers.pidlock_owners()?;
                owners.iter().all(|&pid| self.is_dead(pid, None))
            }
        };

        if holder_dead {
            warn!(
                resource = %self.resource,
                "lock holder is dead, releasing its lock marker"
            );
            remove_marker(&self.markers.lock_path());
        }

        Ok(())
    }

    /// The live PID marker with the oldest arrival time (ties: lowest pid).
    fn oldest_live(&self) -> Result<Option<PidMarker>> {
        Ok(self
            .markers
            .pid_markers()?
            .into_iter()
            .filter(|m| {
                let host = Self::marker_host(&m.path);
                !self.is_dead(m.pid, host.as_deref())
            })
            .min_by(|a, b| a.arrived.cmp(&b.arrived).then(a.pid.cmp(&b.pid))))
    }

    fn register(&self) -> Result<()> {
        let meta = MarkerMetadata::new(self.pid, &self.host);
        atomic_write(self.markers.pid_path(self.pid), meta.to_json()?.as_bytes())
    }

    /// One poll tick.
    fn tick(&mut self) -> Result<Poll> {
        let tick = self.tick;
        self.tick += 1;

        if !self.markers.pid_path(self.pid).exists() {
            warn!(
                resource = %self.resource,
                pid = self.pid,
                "own PID marker disappeared, re-registering"
            );
            self.register()?;
        }

        if tick % u64::from(self.sweep_every_ticks) == 0
            && let Err(e) = self.sweep()
        {
            warn!(resource = %self.resource, error = %e, "marker sweep failed");
        }

        if self.markers.lock_exists() {
            return Ok(Poll::Pending);
        }

        let oldest = match self.oldest_live() {
            Ok(oldest) => oldest,
            Err(e) => {
                warn!(resource = %self.resource, error = %e, "failed to scan PID markers");
                return Ok(Poll::Pending);
            }
        };
        let Some(oldest) = oldest else {
            return Ok(Poll::Pending);
        };
        if oldest.pid != self.pid {
            debug!(resource = %self.resource, next = oldest.pid, "waiting for older participant");
            return Ok(Poll::Pending);
        }

        let meta = MarkerMetadata::new(self.pid, &self.host);
        let content = meta.to_json()?;
        match create_exclusive(self.markers.lock_path(), content.as_bytes()) {
            Ok(true) => {}
            Ok(false) => return Ok(Poll::Pending),
            Err(e) => {
                warn!(resource = %self.resource, error = %e, "failed to create lock marker");
                return Ok(Poll::Pending);
            }
        }

        if let Err(e) = atomic_write(self.markers.pidlock_path(self.pid), content.as_bytes()) {
            warn!(resource = %self.resource, error = %e, "failed to write PID-lock marker");
        }

        Ok(Poll::Granted)
    }
}

impl<O: LivenessOracle + 'static> Locker for LocalFileLocker<O> {
    fn resource(&self) -> &str {
        &self.participant.resource
    }

    fn lock(&mut self) -> Result<()> {
        if self.holding {
            debug!(resource = %self.participant.resource, "lock already held");
            return Ok(());
        }

        self.participant.markers.ensure_dir()?;
        self.participant.register()?;
        debug!(
            resource = %self.participant.resource,
            pid = self.participant.pid,
            "registered PID marker"
        );

        let mut participant = self.participant.clone();
        block_until_granted(
            &self.participant.resource,
            self.settings.poll_interval,
            move || participant.tick(),
        )?;

        self.holding = true;
        info!(
            resource = %self.participant.resource,
            pid = self.participant.pid,
            "lock acquired"
        );
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let p = &self.participant;
        if !self.holding {
            return Err(ExecLockError::NotHeld(format!(
                "pid {} does not hold '{}'",
                p.pid, p.resource
            )));
        }

        match p.markers.lock_owner() {
            Ok(Some(owner)) if owner.pid != p.pid || owner.host != p.host => {
                warn!(
                    resource = %p.resource,
                    owner = %owner.owner,
                    pid = owner.pid,
                    "lock marker now belongs to another participant, leaving it"
                );
            }
            _ => {
                remove_marker(&p.markers.lock_path());
            }
        }
        remove_marker(&p.markers.pidlock_path(p.pid));
        remove_marker(&p.markers.pid_path(p.pid));

        self.holding = false;
        info!(resource = %p.resource, pid = p.pid, "lock released");

        if !self.settings.unlock_cooldown.is_zero() {
            thread::sleep(self.settings.unlock_cooldown);
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.holding
    }
}

impl<O: LivenessOracle + 'static> std::fmt::Debug for LocalFileLocker<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileLocker")
            .field("resource", &self.participant.resource)
            .field("dir", &self.participant.markers.dir())
            .field("pid", &self.participant.pid)
            .field("holding", &self.holding)
            .finish()
    }
}
