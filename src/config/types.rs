//! Configuration enums and default value functions.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Which locking strategy `open()` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// PID and lock marker files in a shared directory.
    #[default]
    Local,
    /// Tickets held by a self-electing coordinator process.
    Remote,
}

impl Strategy {
    /// Parse a strategy from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// How remote participants find (and claim) the coordinator address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    /// Address records created exclusively in a shared directory.
    #[default]
    Directory,
    /// A well-known port per resource; the OS bind is the registration.
    FixedPort,
}

pub(crate) fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("execlock")
}
pub(crate) fn default_poll_interval_ms() -> u64 {
    5_000
}
pub(crate) fn default_sweep_every_ticks() -> u32 {
    12
}
pub(crate) fn default_unlock_cooldown_ms() -> u64 {
    10_000
}
pub(crate) fn default_dead_time_ms() -> u64 {
    30_000
}
pub(crate) fn default_max_working_time_ms() -> u64 {
    120_000
}
pub(crate) fn default_sweep_throttle_ms() -> u64 {
    10_000
}
pub(crate) fn default_rpc_timeout_ms() -> u64 {
    3_000
}
pub(crate) fn default_bind_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
pub(crate) fn default_coordinator_port() -> u16 {
    47_100
}
