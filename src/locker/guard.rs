//! RAII guard over a held locker.

use super::Locker;
use crate::error::Result;
use tracing::warn;

/// Holds a locked [`Locker`] and unlocks it when dropped.
///
/// If unlocking fails during drop, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a, L: Locker + ?Sized> {
    locker: &'a mut L,

    /// Whether the lock has been released manually.
    released: bool,
}

/// Lock `locker` and return a guard that releases it on drop.
pub fn acquire<L: Locker + ?Sized>(locker: &mut L) -> Result<LockGuard<'_, L>> {
    locker.lock()?;
    Ok(LockGuard {
        locker,
        released: false,
    })
}

impl<L: Locker + ?Sized> LockGuard<'_, L> {
    pub fn resource(&self) -> &str {
        self.locker.resource()
    }

    /// Release the lock explicitly, surfacing any error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.locker.unlock()
    }
}

impl<L: Locker + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.locker.unlock()
        {
            warn!(
                resource = self.locker.resource(),
                error = %e,
                "failed to release lock"
            );
        }
    }
}
