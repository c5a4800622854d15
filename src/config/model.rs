//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Configuration for execlock participants.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Strategy
    // =========================================================================
    /// Locking strategy built by `execlock::open`.
    #[serde(default)]
    pub strategy: Strategy,

    /// Shared directory holding marker files (and, by default, registry records).
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    // =========================================================================
    // Polling (both strategies)
    // =========================================================================
    /// Delay between poll iterations while waiting for the lock.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    // =========================================================================
    // Local strategy
    // =========================================================================
    /// Sweep dead PID markers every N poll ticks.
    #[serde(default = "default_sweep_every_ticks")]
    pub sweep_every_ticks: u32,

    /// Pause after `unlock()` so other waiters observe the release.
    #[serde(default = "default_unlock_cooldown_ms")]
    pub unlock_cooldown_ms: u64,

    // =========================================================================
    // Coordinator
    // =========================================================================
    /// Non-working tickets not refreshed within this window are reaped.
    #[serde(default = "default_dead_time_ms")]
    pub dead_time_ms: u64,

    /// Lease length for a working ticket.
    #[serde(default = "default_max_working_time_ms")]
    pub max_working_time_ms: u64,

    /// Minimum time between two sweep/election passes.
    #[serde(default = "default_sweep_throttle_ms")]
    pub sweep_throttle_ms: u64,

    // =========================================================================
    // Remote transport and discovery
    // =========================================================================
    /// Connect/read/write timeout for one coordinator RPC.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// How coordinators are discovered.
    #[serde(default)]
    pub registry: RegistryKind,

    /// Directory for registry records (defaults to `lock_dir`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<PathBuf>,

    /// Address a bootstrapped coordinator binds to.
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,

    /// Well-known coordinator port (fixed-port registry).
    #[serde(default = "default_coordinator_port")]
    pub coordinator_port: u16,

    /// Per-resource port overrides (fixed-port registry).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub coordinator_ports: BTreeMap<String, u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            lock_dir: default_lock_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            sweep_every_ticks: default_sweep_every_ticks(),
            unlock_cooldown_ms: default_unlock_cooldown_ms(),
            dead_time_ms: default_dead_time_ms(),
            max_working_time_ms: default_max_working_time_ms(),
            sweep_throttle_ms: default_sweep_throttle_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            registry: RegistryKind::default(),
            registry_dir: None,
            bind_host: default_bind_host(),
            coordinator_port: default_coordinator_port(),
            coordinator_ports: BTreeMap::new(),
        }
    }
}
