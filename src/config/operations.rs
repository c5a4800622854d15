//! Config loading, validation, and conversion into component settings.

use super::model::Config;
use super::types::RegistryKind;
use crate::coordinator::CoordinatorSettings;
use crate::error::{ExecLockError, Result};
use crate::local::LocalSettings;
use crate::registry::{DirectoryRegistry, FixedPortRegistry, Registry};
use crate::remote::RemoteSettings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            ExecLockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            ExecLockError::UserError(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            ExecLockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values.
    ///
    /// - every interval except `unlock_cooldown_ms` and `sweep_throttle_ms`
    ///   must be positive
    /// - `dead_time_ms` must exceed `poll_interval_ms`, otherwise live waiters
    ///   are reaped between two of their own polls
    /// - the fixed-port registry needs a non-zero port
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("sweep_every_ticks", u64::from(self.sweep_every_ticks)),
            ("dead_time_ms", self.dead_time_ms),
            ("max_working_time_ms", self.max_working_time_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ExecLockError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    name
                )));
            }
        }

        if self.dead_time_ms <= self.poll_interval_ms {
            return Err(ExecLockError::UserError(format!(
                "config validation failed: dead_time_ms ({}) must be greater than poll_interval_ms ({})",
                self.dead_time_ms, self.poll_interval_ms
            )));
        }

        if self.registry == RegistryKind::FixedPort && self.coordinator_port == 0 {
            return Err(ExecLockError::UserError(
                "config validation failed: coordinator_port must be set for the fixed_port registry"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Directory holding registry records.
    pub fn registry_dir(&self) -> PathBuf {
        self.registry_dir
            .clone()
            .unwrap_or_else(|| self.lock_dir.clone())
    }

    pub fn local_settings(&self) -> LocalSettings {
        LocalSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            sweep_every_ticks: self.sweep_every_ticks,
            unlock_cooldown: Duration::from_millis(self.unlock_cooldown_ms),
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            dead_time: Duration::from_millis(self.dead_time_ms),
            max_working_time: Duration::from_millis(self.max_working_time_ms),
            sweep_throttle: Duration::from_millis(self.sweep_throttle_ms),
        }
    }

    pub fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            coordinator: self.coordinator_settings(),
        }
    }

    /// Build the service-discovery registry this config selects.
    pub fn registry(&self) -> Arc<dyn Registry> {
        match self.registry {
            RegistryKind::Directory => {
                Arc::new(DirectoryRegistry::new(self.registry_dir(), self.bind_host))
            }
            RegistryKind::FixedPort => Arc::new(
                FixedPortRegistry::new(self.bind_host, self.coordinator_port)
                    .with_ports(self.coordinator_ports.clone()),
            ),
        }
    }
}
