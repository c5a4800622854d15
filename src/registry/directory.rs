//! Registry records as files in a shared directory.

use super::Registry;
use crate::error::{ExecLockError, Result};
use crate::fs::create_exclusive;
use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Registry storing `<key>.addr` records in a shared directory.
///
/// `bind` listens on an ephemeral port of `bind_host` and then creates the
/// record exclusively; losing that create means another coordinator won.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    dir: PathBuf,
    bind_host: IpAddr,
}

impl DirectoryRegistry {
    pub fn new(dir: impl Into<PathBuf>, bind_host: IpAddr) -> Self {
        Self {
            dir: dir.into(),
            bind_host,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.addr", key))
    }

    fn read_record(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ExecLockError::IoError(format!(
                "failed to read registry record '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Remove the record at `path` only if it holds `expected`.
    ///
    /// The record is first renamed to a private tombstone, so a record
    /// created by a peer after the caller's check is never deleted: it is
    /// linked back into place instead. Returns whether a matching record
    /// was removed.
    pub(super) fn remove_if_matches(&self, path: &Path, expected: &str) -> Result<bool> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let tombstone = self.dir.join(format!(".{}.{}.evict", name, &nonce[..12]));

        match fs::rename(path, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(ExecLockError::IoError(format!(
                    "failed to take registry record '{}': {}",
                    path.display(),
                    e
                )));
            }
        }

        let taken = self.read_record(&tombstone)?.unwrap_or_default();
        let matched = taken == expected;
        if !matched {
            match create_exclusive(path, taken.as_bytes()) {
                Ok(true) => debug!(record = %path.display(), "restored newer registry record"),
                Ok(false) => warn!(
                    record = %path.display(),
                    lost = %taken,
                    "registry record re-created before it could be restored"
                ),
                Err(e) => warn!(record = %path.display(), error = %e, "failed to restore registry record"),
            }
        }
        Self::remove_record(&tombstone)?;
        Ok(matched)
    }

    fn remove_record(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExecLockError::IoError(format!(
                "failed to remove registry record '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

impl Registry for DirectoryRegistry {
    fn resolve(&self, key: &str) -> Result<Option<SocketAddr>> {
        let path = self.record_path(key);
        let Some(content) = self.read_record(&path)? else {
            return Ok(None);
        };

        match content.parse() {
            Ok(addr) => Ok(Some(addr)),
            Err(_) => {
                warn!(
                    record = %path.display(),
                    content = %content,
                    "removing unparseable registry record"
                );
                Self::remove_record(&path)?;
                Ok(None)
            }
        }
    }

    fn bind(&self, key: &str) -> Result<Option<TcpListener>> {
        let listener = TcpListener::bind((self.bind_host, 0)).map_err(|e| {
            ExecLockError::IoError(format!(
                "failed to bind coordinator on {}: {}",
                self.bind_host, e
            ))
        })?;
        let addr = listener.local_addr().map_err(|e| {
            ExecLockError::IoError(format!("failed to read coordinator address: {}", e))
        })?;

        if create_exclusive(self.record_path(key), addr.to_string().as_bytes())? {
            debug!(key, %addr, "registered coordinator");
            Ok(Some(listener))
        } else {
            debug!(key, "registry record already exists");
            Ok(None)
        }
    }

    fn evict(&self, key: &str, addr: SocketAddr) -> Result<()> {
        let path = self.record_path(key);
        let expected = addr.to_string();
        if self.read_record(&path)?.as_deref() != Some(expected.as_str())
            || !self.remove_if_matches(&path, &expected)?
        {
            return Ok(());
        }
        debug!(key, %addr, "evicted registry record");
        Ok(())
    }
}
