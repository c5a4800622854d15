//! Error types for execlock.
//!
//! Uses thiserror for derive macros. Each variant groups one class of failure
//! and maps to a process exit code for the CLI.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for execlock operations.
#[derive(Error, Debug)]
pub enum ExecLockError {
    /// Invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// Marker, registry, or lock directory I/O failed.
    #[error("I/O failure: {0}")]
    IoError(String),

    /// A coordinator could not be reached, or answered with an error.
    #[error("Transport failure: {0}")]
    TransportError(String),

    /// The registered address answers for a different discovery key.
    #[error("Wrong coordinator: {0}")]
    WrongCoordinator(String),

    /// `unlock()` was called by a participant that does not hold the lock.
    #[error("Lock not held: {0}")]
    NotHeld(String),

    /// The lock machinery itself failed (e.g. the poll thread died).
    #[error("Lock acquisition failed: {0}")]
    LockError(String),
}

impl ExecLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecLockError::UserError(_) => exit_codes::USER_ERROR,
            ExecLockError::IoError(_) => exit_codes::IO_FAILURE,
            ExecLockError::TransportError(_) | ExecLockError::WrongCoordinator(_) => {
                exit_codes::TRANSPORT_FAILURE
            }
            ExecLockError::NotHeld(_) | ExecLockError::LockError(_) => exit_codes::LOCK_FAILURE,
        }
    }

    /// Whether this error came from the RPC layer (expected while polling).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ExecLockError::TransportError(_) | ExecLockError::WrongCoordinator(_)
        )
    }
}

/// Result type alias for execlock operations.
pub type Result<T> = std::result::Result<T, ExecLockError>;
