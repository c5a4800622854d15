//! On-disk layout of the local strategy.
//!
//! Per resource `R` in the shared directory:
//!
//! - `R.lock`: existence implies a holder exists
//! - `R-<pid>.pidlock`: pid `<pid>` believes it holds `R`
//! - `R-<pid>.pid`: pid `<pid>` is waiting for or holding `R`; its mtime is
//!   the arrival time used for fairness

use super::metadata::MarkerMetadata;
use crate::error::{ExecLockError, Result};
use crate::liveness::LivenessOracle;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

const PID_SUFFIX: &str = ".pid";
const PIDLOCK_SUFFIX: &str = ".pidlock";
const LOCK_SUFFIX: &str = ".lock";

/// Kind of marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Lock,
    PidLock,
    Pid,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Lock => "lock",
            MarkerKind::PidLock => "pidlock",
            MarkerKind::Pid => "pid",
        }
    }
}

/// A marker found on disk.
#[derive(Debug, Clone)]
pub struct MarkerInfo {
    pub path: PathBuf,
    pub kind: MarkerKind,

    /// Owning pid (from the file name, or the metadata for lock markers).
    pub pid: Option<u32>,

    /// Parsed content, if readable.
    pub metadata: Option<MarkerMetadata>,

    pub modified: Option<SystemTime>,

    /// Liveness of the owner as seen from this host; `None` when unknown.
    pub alive: Option<bool>,
}

impl std::fmt::Display for MarkerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        write!(f, "{} ({}", name, self.kind.as_str())?;
        if let Some(meta) = &self.metadata {
            write!(f, ", owner: {}, age: {}", meta.owner, meta.age_string())?;
        }
        match self.alive {
            Some(false) => write!(f, ", DEAD)"),
            _ => write!(f, ")"),
        }
    }
}

/// A PID marker and its arrival time.
#[derive(Debug, Clone)]
pub(crate) struct PidMarker {
    pub pid: u32,
    pub path: PathBuf,
    pub arrived: SystemTime,
}

/// Paths and scans for one resource in one directory.
#[derive(Debug, Clone)]
pub(crate) struct Markers {
    dir: PathBuf,
    resource: String,
}

impl Markers {
    pub fn new(dir: impl Into<PathBuf>, resource: &str) -> Self {
        Self {
            dir: dir.into(),
            resource: resource.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", self.resource, LOCK_SUFFIX))
    }

    pub fn pid_path(&self, pid: u32) -> PathBuf {
        self.dir
            .join(format!("{}-{}{}", self.resource, pid, PID_SUFFIX))
    }

    pub fn pidlock_path(&self, pid: u32) -> PathBuf {
        self.dir
            .join(format!("{}-{}{}", self.resource, pid, PIDLOCK_SUFFIX))
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ExecLockError::IoError(format!(
                "failed to create lock directory '{}': {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Parse `R-<pid><suffix>` file names belonging to this resource.
    fn pid_from_name(&self, name: &str, suffix: &str) -> Option<u32> {
        let digits = name
            .strip_prefix(self.resource.as_str())?
            .strip_prefix('-')?
            .strip_suffix(suffix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn scan(&self, suffix: &str) -> Result<Vec<(u32, PathBuf, Option<SystemTime>)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ExecLockError::IoError(format!(
                    "failed to read lock directory '{}': {}",
                    self.dir.display(),
                    e
                )));
            }
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ExecLockError::IoError(format!("failed to read lock directory entry: {}", e))
            })?;
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|n| self.pid_from_name(n, suffix)) else {
                continue;
            };
            // A marker can vanish between listing and stat when a peer sweeps it.
            let modified = entry.metadata().and_then(|m| m.modified()).ok();
            found.push((pid, entry.path(), modified));
        }
        Ok(found)
    }

    /// All PID markers that still exist, with their arrival time.
    pub fn pid_markers(&self) -> Result<Vec<PidMarker>> {
        Ok(self
            .scan(PID_SUFFIX)?
            .into_iter()
            .filter_map(|(pid, path, modified)| {
                modified.map(|arrived| PidMarker { pid, path, arrived })
            })
            .collect())
    }

    /// Pids that own a PID-lock marker.
    pub fn pidlock_owners(&self) -> Result<Vec<u32>> {
        Ok(self
            .scan(PIDLOCK_SUFFIX)?
            .into_iter()
            .map(|(pid, _, _)| pid)
            .collect())
    }

    pub fn lock_exists(&self) -> bool {
        self.lock_path().exists()
    }

    /// Metadata of the current lock marker; `Ok(None)` if there is none.
    pub fn lock_owner(&self) -> Result<Option<MarkerMetadata>> {
        match MarkerMetadata::from_file(self.lock_path()) {
            Ok(meta) => Ok(Some(meta)),
            Err(_) if !self.lock_exists() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Remove a marker, logging instead of failing. A missing marker is fine.
pub(crate) fn remove_marker(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        warn!(marker = %path.display(), error = %e, "failed to remove marker");
    }
}

/// List every marker for `resource` in `dir`, with owner liveness.
///
/// Liveness is only reported for markers recorded on `host`; markers from
/// other hosts report `None`.
pub fn list_markers<O: LivenessOracle + ?Sized>(
    dir: &Path,
    resource: &str,
    oracle: &O,
    host: &str,
) -> Result<Vec<MarkerInfo>> {
    let markers = Markers::new(dir, resource);
    let mut found = Vec::new();

    let alive_for = |pid: u32, meta: &Option<MarkerMetadata>| -> Option<bool> {
        match meta {
            Some(m) if m.host != host => None,
            _ => Some(oracle.is_alive(pid)),
        }
    };

    let lock_path = markers.lock_path();
    if let Ok(fs_meta) = fs::metadata(&lock_path) {
        let metadata = MarkerMetadata::from_file(&lock_path).ok();
        let pid = metadata.as_ref().map(|m| m.pid);
        let alive = pid.and_then(|p| alive_for(p, &metadata));
        found.push(MarkerInfo {
            path: lock_path,
            kind: MarkerKind::Lock,
            pid,
            metadata,
            modified: fs_meta.modified().ok(),
            alive,
        });
    }

    for (kind, suffix) in [
        (MarkerKind::PidLock, PIDLOCK_SUFFIX),
        (MarkerKind::Pid, PID_SUFFIX),
    ] {
        let mut scanned = markers.scan(suffix)?;
        scanned.sort_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0)));
        for (pid, path, modified) in scanned {
            let metadata = MarkerMetadata::from_file(&path).ok();
            let alive = alive_for(pid, &metadata);
            found.push(MarkerInfo {
                path,
                kind,
                pid: Some(pid),
                metadata,
                modified,
                alive,
            });
        }
    }

    Ok(found)
}

/// Remove every marker for `resource` in `dir`.
///
/// This is an operator recovery tool: the caller is responsible for making
/// sure no participant is still active. Returns the removed paths.
pub fn clear_markers(dir: &Path, resource: &str) -> Result<Vec<PathBuf>> {
    let markers = Markers::new(dir, resource);
    let mut removed = Vec::new();

    let mut paths = vec![markers.lock_path()];
    for suffix in [PIDLOCK_SUFFIX, PID_SUFFIX] {
        paths.extend(markers.scan(suffix)?.into_iter().map(|(_, path, _)| path));
    }

    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ExecLockError::IoError(format!(
                    "failed to remove marker '{}': {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    Ok(removed)
}
