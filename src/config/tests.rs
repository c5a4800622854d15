//! Tests for config functionality.

use crate::config::{Config, RegistryKind, Strategy};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.strategy, Strategy::Local);
    assert_eq!(config.poll_interval_ms, 5_000);
    assert_eq!(config.sweep_every_ticks, 12);
    assert_eq!(config.unlock_cooldown_ms, 10_000);
    assert_eq!(config.dead_time_ms, 30_000);
    assert_eq!(config.max_working_time_ms, 120_000);
    assert_eq!(config.sweep_throttle_ms, 10_000);
    assert_eq!(config.registry, RegistryKind::Directory);
    assert!(config.registry_dir.is_none());
    assert_eq!(config.registry_dir(), config.lock_dir);
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_minimal_yaml() {
    let config = Config::from_yaml("").unwrap();

    assert_eq!(config.poll_interval_ms, 5_000);
    assert_eq!(config.strategy, Strategy::Local);
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
strategy: remote
poll_interval_ms: 250
registry: fixed_port
coordinator_port: 48000
coordinator_ports:
  build: 48001
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.strategy, Strategy::Remote);
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.registry, RegistryKind::FixedPort);
    assert_eq!(config.coordinator_port, 48_000);
    assert_eq!(config.coordinator_ports.get("build"), Some(&48_001));

    // Unspecified values keep their defaults
    assert_eq!(config.dead_time_ms, 30_000);
}

#[test]
fn test_unknown_fields_are_ignored() {
    let yaml = "poll_interval_ms: 100\nsome_future_option: true\n";
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.poll_interval_ms, 100);
}

#[test]
fn test_invalid_strategy_is_rejected() {
    let result = Config::from_yaml("strategy: carrier_pigeon\n");
    assert!(result.is_err());
}

#[test]
fn test_zero_poll_interval_is_rejected() {
    let err = Config::from_yaml("poll_interval_ms: 0\n").unwrap_err();
    assert!(err.to_string().contains("poll_interval_ms"));
}

#[test]
fn test_dead_time_must_exceed_poll_interval() {
    let err = Config::from_yaml("poll_interval_ms: 30000\ndead_time_ms: 30000\n").unwrap_err();
    assert!(err.to_string().contains("dead_time_ms"));
}

#[test]
fn test_zero_cooldown_and_throttle_are_allowed() {
    let config = Config::from_yaml("unlock_cooldown_ms: 0\nsweep_throttle_ms: 0\n").unwrap();
    assert_eq!(config.local_settings().unlock_cooldown, Duration::ZERO);
    assert_eq!(config.coordinator_settings().sweep_throttle, Duration::ZERO);
}

#[test]
fn test_fixed_port_requires_port() {
    let err = Config::from_yaml("registry: fixed_port\ncoordinator_port: 0\n").unwrap_err();
    assert!(err.to_string().contains("coordinator_port"));
}

#[test]
fn test_settings_conversion() {
    let yaml = r#"
poll_interval_ms: 200
sweep_every_ticks: 3
unlock_cooldown_ms: 50
dead_time_ms: 1000
max_working_time_ms: 4000
sweep_throttle_ms: 20
rpc_timeout_ms: 500
"#;
    let config = Config::from_yaml(yaml).unwrap();

    let local = config.local_settings();
    assert_eq!(local.poll_interval, Duration::from_millis(200));
    assert_eq!(local.sweep_every_ticks, 3);
    assert_eq!(local.unlock_cooldown, Duration::from_millis(50));

    let remote = config.remote_settings();
    assert_eq!(remote.poll_interval, Duration::from_millis(200));
    assert_eq!(remote.rpc_timeout, Duration::from_millis(500));
    assert_eq!(remote.coordinator.dead_time, Duration::from_millis(1000));
    assert_eq!(remote.coordinator.max_working_time, Duration::from_millis(4000));
    assert_eq!(remote.coordinator.sweep_throttle, Duration::from_millis(20));
}

#[test]
fn test_yaml_roundtrip_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("execlock.yaml");

    let mut config = Config::default();
    config.strategy = Strategy::Remote;
    config.lock_dir = temp_dir.path().join("locks");
    std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.strategy, Strategy::Remote);
    assert_eq!(loaded.lock_dir, temp_dir.path().join("locks"));
}

#[test]
fn test_load_missing_file_is_user_error() {
    let err = Config::load("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, crate::error::ExecLockError::UserError(_)));
}

#[test]
fn test_strategy_from_str() {
    assert_eq!(Strategy::from_str("local"), Some(Strategy::Local));
    assert_eq!(Strategy::from_str("remote"), Some(Strategy::Remote));
    assert_eq!(Strategy::from_str("nfs"), None);
}
