//! Process liveness checks.
//!
//! A [`LivenessOracle`] answers "is OS process P running on this host". It is
//! only ever consulted for entries recorded on the local host; pids from other
//! hosts are meaningless here and are left to the timeout-based reaping.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

/// Capability answering whether a local process is still running.
pub trait LivenessOracle: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

impl<T: LivenessOracle + ?Sized> LivenessOracle for Arc<T> {
    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }
}

/// Liveness backed by the operating system's process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLiveness;

impl LivenessOracle for OsLiveness {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        // Signal 0 performs the permission and existence checks only.
        if unsafe { libc::kill(raw, 0) } == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(windows)]
    fn is_alive(&self, pid: u32) -> bool {
        use windows_sys::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, STILL_ACTIVE};
        use windows_sys::Win32::System::Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        if pid == 0 {
            return false;
        }
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        if handle.is_null() {
            // Protected processes refuse the handle but exist.
            return std::io::Error::last_os_error().raw_os_error()
                == Some(ERROR_ACCESS_DENIED as i32);
        }

        let mut code = 0u32;
        let queried = unsafe { GetExitCodeProcess(handle, &mut code) };
        unsafe { CloseHandle(handle) };
        // An exited process stays openable while anyone holds a handle to it.
        queried != 0 && code == STILL_ACTIVE as u32
    }
}

#[cfg(not(any(unix, windows)))]
compile_error!("execlock needs a process liveness check for this platform");

/// Oracle with an explicit set of dead pids; everything else is alive.
///
/// Used to simulate crashed participants without killing real processes.
#[derive(Debug, Clone, Default)]
pub struct StaticLiveness {
    dead: Arc<Mutex<HashSet<u32>>>,
}

impl StaticLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self, pid: u32) {
        self.dead.lock().insert(pid);
    }

    pub fn revive(&self, pid: u32) {
        self.dead.lock().remove(&pid);
    }
}

impl LivenessOracle for StaticLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        !self.dead.lock().contains(&pid)
    }
}

/// Name of this host, as recorded in markers and tickets.
pub fn local_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
