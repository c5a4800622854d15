//! The locker contract shared by both strategies.
//!
//! A [`Locker`] is an explicit handle for one resource name. `lock()` blocks
//! until this participant is the exclusive holder, `unlock()` releases. There
//! is no built-in deadline: a caller that needs one must impose it.
//!
//! Internally both strategies run their poll loop on a background thread and
//! the calling thread waits for its completion signal (see [`poll`]).

mod guard;
pub(crate) mod poll;

pub use guard::{LockGuard, acquire};

use crate::error::Result;

/// Cross-process mutual exclusion on a named resource.
pub trait Locker {
    /// The resource name this handle locks.
    fn resource(&self) -> &str;

    /// Block until this participant exclusively holds the resource.
    fn lock(&mut self) -> Result<()>;

    /// Release the resource. Only valid while holding it.
    fn unlock(&mut self) -> Result<()>;

    /// Whether this handle currently believes it holds the resource.
    fn is_held(&self) -> bool;
}

impl<L: Locker + ?Sized> Locker for Box<L> {
    fn resource(&self) -> &str {
        (**self).resource()
    }

    fn lock(&mut self) -> Result<()> {
        (**self).lock()
    }

    fn unlock(&mut self) -> Result<()> {
        (**self).unlock()
    }

    fn is_held(&self) -> bool {
        (**self).is_held()
    }
}

/// Validate a resource name for use in file names and discovery keys.
pub(crate) fn validate_resource(resource: &str) -> Result<()> {
    use crate::error::ExecLockError;

    if resource.is_empty() {
        return Err(ExecLockError::UserError(
            "resource name must not be empty".to_string(),
        ));
    }
    if let Some(bad) = resource
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(ExecLockError::UserError(format!(
            "resource name '{}' contains '{}'; use ASCII letters, digits, '_', '-' or '.'",
            resource, bad
        )));
    }
    if resource.starts_with('.') {
        return Err(ExecLockError::UserError(format!(
            "resource name '{}' must not start with '.'",
            resource
        )));
    }
    Ok(())
}
