//! execlock: a cross-process global execution lock.
//!
//! Independent processes serialize access to a named resource through one of
//! two interchangeable strategies behind the [`Locker`] trait:
//!
//! - [`LocalFileLocker`]: PID marker files in a shared directory, oldest
//!   arrival first, with a periodic sweep of markers left by dead processes.
//! - [`RemoteLocker`]: tickets held by a [`TicketCoordinator`] that one of
//!   the participants starts on demand and registers for discovery.
//!
//! [`open`] builds the configured strategy from a [`Config`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod liveness;
pub mod local;
pub mod locker;
pub mod registry;
pub mod remote;
pub mod rpc;
pub mod ticket;

pub use config::{Config, Strategy};
pub use coordinator::TicketCoordinator;
pub use error::{ExecLockError, Result};
pub use local::LocalFileLocker;
pub use locker::{LockGuard, Locker, acquire};
pub use remote::RemoteLocker;

/// Build the locker `config` selects for `resource`.
pub fn open(config: &Config, resource: &str) -> Result<Box<dyn Locker + Send>> {
    match config.strategy {
        Strategy::Local => Ok(Box::new(
            LocalFileLocker::new(&config.lock_dir, resource)?.with_settings(config.local_settings()),
        )),
        Strategy::Remote => Ok(Box::new(RemoteLocker::new(
            resource,
            config.registry(),
            config.remote_settings(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir, strategy: Strategy) -> Config {
        Config {
            strategy,
            lock_dir: temp.path().to_path_buf(),
            poll_interval_ms: 50,
            unlock_cooldown_ms: 0,
            ..Config::default()
        }
    }

    #[test]
    fn open_local_locks_and_unlocks() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp, Strategy::Local);

        let mut locker = open(&config, "build").unwrap();
        assert_eq!(locker.resource(), "build");

        locker.lock().unwrap();
        assert!(locker.is_held());
        assert!(temp.path().join("build.lock").exists());

        locker.unlock().unwrap();
        assert!(!locker.is_held());
        assert!(!temp.path().join("build.lock").exists());
    }

    #[test]
    fn open_remote_bootstraps_coordinator() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp, Strategy::Remote);

        let mut locker = open(&config, "deploy").unwrap();
        let guard = acquire(&mut locker).unwrap();
        assert_eq!(guard.resource(), "deploy");
        guard.release().unwrap();
        assert!(!locker.is_held());
    }

    #[test]
    fn open_rejects_bad_resource() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp, Strategy::Local);

        let Err(err) = open(&config, "a/b") else {
            panic!("expected an invalid resource name to be rejected");
        };
        assert!(matches!(err, ExecLockError::UserError(_)));
    }
}
