//! Service discovery for ticket coordinators.
//!
//! Every resource has one well-known discovery key, `locker-<resource>`. A
//! [`Registry`] maps the key to the address of the coordinator currently
//! serving it, and provides the one truly exclusive step of the remote
//! strategy: [`Registry::bind`] either registers the caller as the
//! coordinator (first bind wins) or reports that someone else already did.

mod directory;
mod fixed_port;

pub use directory::DirectoryRegistry;
pub use fixed_port::FixedPortRegistry;

use crate::error::Result;
use std::net::{SocketAddr, TcpListener};

/// Discovery key of the coordinator for `resource`.
pub fn discovery_key(resource: &str) -> String {
    format!("locker-{}", resource)
}

/// Where participants find the coordinator for a discovery key.
pub trait Registry: Send + Sync {
    /// Address registered for `key`, if any. Reachability is not checked.
    fn resolve(&self, key: &str) -> Result<Option<SocketAddr>>;

    /// Exclusively register a new coordinator for `key`.
    ///
    /// Returns the listener the coordinator must serve on, or `None` when
    /// another participant holds the registration (the caller stays a client).
    fn bind(&self, key: &str) -> Result<Option<TcpListener>>;

    /// Drop the registration for `key` if it still points at `addr`.
    ///
    /// Used both to clear a dead coordinator's record and by a coordinator
    /// shutting down cleanly.
    fn evict(&self, key: &str, addr: SocketAddr) -> Result<()>;

    /// Handle `addr` answering for a key other than `key`.
    ///
    /// Registries whose records can go stale drop the record so the caller
    /// can bootstrap; registries that cannot give `key` its own address fail.
    fn evict_foreign(&self, key: &str, addr: SocketAddr) -> Result<()> {
        self.evict(key, addr)
    }
}
