//! Well-known ports: the OS exclusive bind is the registration.

use super::Registry;
use crate::error::{ExecLockError, Result};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

/// Registry mapping each key to a fixed port on `host`.
///
/// Resources listed in `ports` get their own port; all others share
/// `default_port`, which only works while one resource is in use per host.
#[derive(Debug, Clone)]
pub struct FixedPortRegistry {
    host: IpAddr,
    default_port: u16,
    ports: BTreeMap<String, u16>,
}

impl FixedPortRegistry {
    pub fn new(host: IpAddr, default_port: u16) -> Self {
        Self {
            host,
            default_port,
            ports: BTreeMap::new(),
        }
    }

    /// Per-resource port overrides, keyed by resource name.
    pub fn with_ports(mut self, ports: BTreeMap<String, u16>) -> Self {
        self.ports = ports;
        self
    }

    fn port_for(&self, key: &str) -> u16 {
        self.ports
            .get(resource_of(key))
            .copied()
            .unwrap_or(self.default_port)
    }

    fn addr_for(&self, key: &str) -> SocketAddr {
        SocketAddr::new(self.host, self.port_for(key))
    }
}

fn resource_of(key: &str) -> &str {
    key.strip_prefix("locker-").unwrap_or(key)
}

impl Registry for FixedPortRegistry {
    fn resolve(&self, key: &str) -> Result<Option<SocketAddr>> {
        let mut addr = self.addr_for(key);
        if addr.ip().is_unspecified() {
            addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        Ok(Some(addr))
    }

    fn bind(&self, key: &str) -> Result<Option<TcpListener>> {
        let addr = self.addr_for(key);
        match TcpListener::bind(addr) {
            Ok(listener) => Ok(Some(listener)),
            Err(e) if e.kind() == ErrorKind::AddrInUse => Ok(None),
            Err(e) => Err(ExecLockError::IoError(format!(
                "failed to bind coordinator on {}: {}",
                addr, e
            ))),
        }
    }

    fn evict(&self, _key: &str, _addr: SocketAddr) -> Result<()> {
        // The registration disappears with the listening socket.
        Ok(())
    }

    fn evict_foreign(&self, key: &str, addr: SocketAddr) -> Result<()> {
        Err(ExecLockError::UserError(format!(
            "port {} for '{}' is taken by a coordinator for another resource; \
             give '{}' its own entry in coordinator_ports",
            addr.port(),
            key,
            resource_of(key)
        )))
    }
}
