//! Serving a coordinator over TCP.

use super::service::TicketCoordinator;
use crate::error::{ExecLockError, Result};
use crate::registry::Registry;
use crate::rpc::{self, Request, Response};
use parking_lot::Mutex;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A running coordinator.
///
/// Dropping the handle shuts the coordinator down and removes its registry
/// record; waiters then bootstrap a replacement.
pub struct CoordinatorHandle {
    coordinator: Arc<TicketCoordinator>,
    addr: SocketAddr,
    registry: Option<Arc<dyn Registry>>,
    stop: Arc<AtomicBool>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

/// Serve `coordinator` on `listener` until the handle is shut down.
///
/// `registry`, if given, is the registry the listener was bound through; the
/// record is evicted on shutdown.
pub fn serve(
    coordinator: Arc<TicketCoordinator>,
    listener: TcpListener,
    registry: Option<Arc<dyn Registry>>,
    io_timeout: Duration,
) -> Result<CoordinatorHandle> {
    let addr = listener.local_addr().map_err(|e| {
        ExecLockError::IoError(format!("failed to read coordinator address: {}", e))
    })?;
    let stop = Arc::new(AtomicBool::new(false));

    let accept_thread = {
        let coordinator = Arc::clone(&coordinator);
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name(format!("execlock-{}", coordinator.key()))
            .spawn(move || accept_loop(&coordinator, &listener, &stop, io_timeout))
            .map_err(|e| {
                ExecLockError::IoError(format!("failed to start coordinator thread: {}", e))
            })?
    };

    info!(key = coordinator.key(), %addr, "coordinator serving");
    Ok(CoordinatorHandle {
        coordinator,
        addr,
        registry,
        stop,
        accept_thread: Mutex::new(Some(accept_thread)),
    })
}

fn accept_loop(
    coordinator: &Arc<TicketCoordinator>,
    listener: &TcpListener,
    stop: &AtomicBool,
    io_timeout: Duration,
) {
    for stream in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let handler = Arc::clone(coordinator);
                let spawned = thread::Builder::new()
                    .name("execlock-rpc".to_string())
                    .spawn(move || {
                        if let Err(e) = handle_connection(&handler, &stream, io_timeout) {
                            debug!(key = handler.key(), error = %e, "rpc connection failed");
                        }
                    });
                if let Err(e) = spawned {
                    warn!(key = coordinator.key(), error = %e, "failed to spawn rpc handler");
                }
            }
            Err(e) => {
                debug!(key = coordinator.key(), error = %e, "accept failed");
            }
        }
    }
    debug!(key = coordinator.key(), "coordinator stopped accepting");
}

fn handle_connection(
    coordinator: &TicketCoordinator,
    stream: &TcpStream,
    io_timeout: Duration,
) -> Result<()> {
    stream
        .set_read_timeout(Some(io_timeout))
        .and_then(|()| stream.set_write_timeout(Some(io_timeout)))
        .map_err(|e| ExecLockError::TransportError(format!("failed to configure socket: {}", e)))?;

    let response = match rpc::read_message::<Request>(stream) {
        Ok(request) => coordinator.handle(request),
        // Probes connect and hang up without sending anything.
        Err(e) => Response::Error {
            message: e.to_string(),
        },
    };
    rpc::write_message(stream, &response)
}

impl CoordinatorHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn coordinator(&self) -> &Arc<TicketCoordinator> {
        &self.coordinator
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }

    /// Stop accepting requests and drop the registry record. Idempotent.
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }

        // Wake the blocking accept so the loop sees the stop flag.
        let _ = TcpStream::connect_timeout(&rpc::dial_addr(self.addr), Duration::from_secs(1));
        if let Some(thread) = self.accept_thread.lock().take() {
            let _ = thread.join();
        }

        if let Some(registry) = &self.registry
            && let Err(e) = registry.evict(self.coordinator.key(), self.addr)
        {
            warn!(key = self.coordinator.key(), error = %e, "failed to remove registry record");
        }
        info!(key = self.coordinator.key(), addr = %self.addr, "coordinator shut down");
    }

    /// Block until the coordinator stops (for foreground hosting).
    pub fn wait(&self) {
        let thread = self.accept_thread.lock().take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("key", &self.coordinator.key())
            .field("addr", &self.addr)
            .field("running", &self.is_running())
            .finish()
    }
}
