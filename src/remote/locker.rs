//! `RemoteLocker`: coordinator client plus coordinator bootstrap.

use crate::coordinator::{CoordinatorHandle, CoordinatorSettings, TicketCoordinator, serve};
use crate::error::{ExecLockError, Result};
use crate::liveness::{LivenessOracle, OsLiveness, local_host};
use crate::locker::poll::{Poll, block_until_granted};
use crate::locker::{Locker, validate_resource};
use crate::registry::{Registry, discovery_key};
use crate::rpc;
use crate::ticket::Ticket;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing knobs of the remote strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Delay between two `GetTickets` polls.
    pub poll_interval: Duration,

    /// Timeout of one RPC.
    pub rpc_timeout: Duration,

    /// Settings for coordinators this participant bootstraps.
    pub coordinator: CoordinatorSettings,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(3),
            coordinator: CoordinatorSettings::default(),
        }
    }
}

/// Participant in the ticket protocol for one resource.
pub struct RemoteLocker {
    participant: Participant,
    ticket: Option<Ticket>,
    holding: bool,
}

/// Everything the poll thread needs; clones share the snapshot and the
/// hosted coordinator.
#[derive(Clone)]
struct Participant {
    resource: String,
    key: String,
    registry: Arc<dyn Registry>,
    settings: RemoteSettings,
    oracle: Arc<dyn LivenessOracle>,
    pid: u32,
    host: String,

    /// Last ticket set received from a coordinator.
    known: Arc<Mutex<Vec<Ticket>>>,

    /// Coordinator this participant bootstrapped, if any.
    hosted: Arc<Mutex<Option<CoordinatorHandle>>>,
}

impl RemoteLocker {
    pub fn new(resource: &str, registry: Arc<dyn Registry>, settings: RemoteSettings) -> Result<Self> {
        validate_resource(resource)?;
        Ok(Self {
            participant: Participant {
                resource: resource.to_string(),
                key: discovery_key(resource),
                registry,
                settings,
                oracle: Arc::new(OsLiveness),
                pid: std::process::id(),
                host: local_host(),
                known: Arc::new(Mutex::new(Vec::new())),
                hosted: Arc::new(Mutex::new(None)),
            },
            ticket: None,
            holding: false,
        })
    }

    /// Liveness oracle for coordinators this participant bootstraps.
    pub fn with_oracle(mut self, oracle: Arc<dyn LivenessOracle>) -> Self {
        self.participant.oracle = oracle;
        self
    }

    /// Act as process `pid` instead of the current process.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.participant.pid = pid;
        self
    }

    /// The ticket of the current request, while waiting or holding.
    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    /// Address of the coordinator this participant hosts, if any.
    pub fn hosting(&self) -> Option<SocketAddr> {
        self.participant
            .hosted
            .lock()
            .as_ref()
            .filter(|h| h.is_running())
            .map(|h| h.addr())
    }

    /// Last ticket set this participant received.
    pub fn known_tickets(&self) -> Vec<Ticket> {
        self.participant.known.lock().clone()
    }

    /// Ask the current coordinator for its ticket set without registering.
    pub fn query(&self) -> Result<Vec<Ticket>> {
        let p = &self.participant;
        let addr = p.registry.resolve(&p.key)?.ok_or_else(|| {
            ExecLockError::TransportError(format!("no coordinator registered for '{}'", p.key))
        })?;
        rpc::snapshot(addr, &p.key, p.settings.rpc_timeout)
    }

    /// Stop a coordinator this participant hosts. Waiters elsewhere will
    /// bootstrap a replacement.
    pub fn stop_hosting(&self) {
        if let Some(handle) = self.participant.hosted.lock().take() {
            handle.shutdown();
        }
    }
}

impl Participant {
    /// One poll iteration.
    fn poll_once(&self, ticket: &Ticket) -> Result<Poll> {
        match self.registry.resolve(&self.key) {
            Ok(Some(addr)) => {
                match rpc::get_tickets(addr, &self.key, ticket, self.settings.rpc_timeout) {
                    Ok(tickets) => {
                        let granted = tickets.iter().any(|t| t.id == ticket.id && t.working);
                        *self.known.lock() = tickets;
                        return Ok(if granted { Poll::Granted } else { Poll::Pending });
                    }
                    Err(ExecLockError::WrongCoordinator(msg)) => {
                        warn!(key = %self.key, %addr, "{}, dropping the record", msg);
                        self.registry.evict_foreign(&self.key, addr)?;
                    }
                    Err(e) => {
                        debug!(key = %self.key, %addr, error = %e, "coordinator call failed");
                        if rpc::probe(addr, self.settings.rpc_timeout) {
                            // Reachable but not answering properly; do not replace it.
                            return Ok(Poll::Pending);
                        }
                        if let Err(e) = self.registry.evict(&self.key, addr) {
                            warn!(key = %self.key, error = %e, "failed to evict dead coordinator");
                        }
                    }
                }
            }
            Ok(None) => debug!(key = %self.key, "no coordinator registered"),
            Err(e) => debug!(key = %self.key, error = %e, "coordinator lookup failed"),
        }

        match self.bootstrap(Some(ticket)) {
            Ok(true) => Ok(Poll::RetryNow),
            Ok(false) => Ok(Poll::Pending),
            Err(e) => {
                warn!(key = %self.key, error = %e, "coordinator bootstrap failed");
                Ok(Poll::Pending)
            }
        }
    }

    /// Start a coordinator seeded with what this participant knows.
    ///
    /// Returns `false` when another participant won the registration.
    fn bootstrap(&self, own: Option<&Ticket>) -> Result<bool> {
        let Some(listener) = self.registry.bind(&self.key)? else {
            debug!(key = %self.key, "another participant registered a coordinator first");
            return Ok(false);
        };

        let mut seed = self.known.lock().clone();
        if let Some(own) = own
            && !seed.contains(own)
        {
            seed.push(own.clone());
        }

        let coordinator = TicketCoordinator::new(&self.resource, self.settings.coordinator)
            .with_oracle(Arc::clone(&self.oracle))
            .with_host(self.host.clone())
            .seeded(seed);
        let handle = serve(
            Arc::new(coordinator),
            listener,
            Some(Arc::clone(&self.registry)),
            self.settings.rpc_timeout,
        )?;

        info!(key = %self.key, addr = %handle.addr(), "bootstrapped coordinator");
        let previous = self.hosted.lock().replace(handle);
        if let Some(previous) = previous {
            previous.shutdown();
        }
        Ok(true)
    }

    fn end_work(&self, ticket: &Ticket) -> Result<()> {
        let addr = self.registry.resolve(&self.key)?.ok_or_else(|| {
            ExecLockError::TransportError(format!("no coordinator registered for '{}'", self.key))
        })?;
        match rpc::end_work(addr, &self.key, ticket, self.settings.rpc_timeout) {
            Ok(()) => Ok(()),
            Err(ExecLockError::WrongCoordinator(msg)) => {
                self.registry.evict_foreign(&self.key, addr)?;
                Err(ExecLockError::WrongCoordinator(msg))
            }
            Err(e) => {
                if !rpc::probe(addr, self.settings.rpc_timeout)
                    && let Err(evict_err) = self.registry.evict(&self.key, addr)
                {
                    warn!(key = %self.key, error = %evict_err, "failed to evict dead coordinator");
                }
                Err(e)
            }
        }
    }
}

impl Locker for RemoteLocker {
    fn resource(&self) -> &str {
        &self.participant.resource
    }

    fn lock(&mut self) -> Result<()> {
        if self.holding {
            debug!(resource = %self.participant.resource, "lock already held");
            return Ok(());
        }

        let ticket = Ticket::new(self.participant.pid, Some(self.participant.host.clone()));
        debug!(resource = %self.participant.resource, ticket = %ticket.id, "requesting lock");
        self.ticket = Some(ticket.clone());

        let participant = self.participant.clone();
        let polled = block_until_granted(
            &self.participant.resource,
            self.participant.settings.poll_interval,
            move || participant.poll_once(&ticket),
        );
        if let Err(e) = polled {
            self.ticket = None;
            return Err(e);
        }

        self.holding = true;
        info!(resource = %self.participant.resource, "lock acquired");
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let p = &self.participant;
        let ticket = match (&self.ticket, self.holding) {
            (Some(ticket), true) => ticket.clone(),
            _ => {
                return Err(ExecLockError::NotHeld(format!(
                    "pid {} does not hold '{}'",
                    p.pid, p.resource
                )));
            }
        };

        if let Err(e) = p.end_work(&ticket) {
            debug!(key = %p.key, error = %e, "end_work failed, bootstrapping a coordinator");
            // The seed is the last snapshot, in which this ticket is working.
            if let Err(e) = p.bootstrap(None) {
                warn!(key = %p.key, error = %e, "coordinator bootstrap failed");
            }
            p.end_work(&ticket)?;
        }

        self.ticket = None;
        self.holding = false;
        info!(resource = %p.resource, "lock released");
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.holding
    }
}

impl std::fmt::Debug for RemoteLocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLocker")
            .field("resource", &self.participant.resource)
            .field("pid", &self.participant.pid)
            .field("ticket", &self.ticket.as_ref().map(|t| t.id.as_str()))
            .field("holding", &self.holding)
            .finish()
    }
}
