//! Ticket coordinator for the remote strategy.
//!
//! One coordinator per resource holds every participant's [`Ticket`] and
//! decides who works. It is reachable through the [`Registry`] under the
//! resource's discovery key and answers two RPCs, `GetTickets` and `EndWork`.
//!
//! # Sweep and election
//!
//! At most once per `sweep_throttle` (and after every successful `EndWork`):
//!
//! 1. Waiting tickets idle for longer than `dead_time` are reaped.
//! 2. A working ticket held for longer than `max_working_time` is evicted.
//! 3. Tickets of processes known dead on this host are removed.
//! 4. With nobody working, the smallest `(created_at, id)` ticket is elected.
//!
//! [`Ticket`]: crate::ticket::Ticket
//! [`Registry`]: crate::registry::Registry

mod server;
mod service;
mod ticket_set;


pub use server::{CoordinatorHandle, serve};
pub use service::TicketCoordinator;

use std::time::Duration;

/// Timing knobs of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Waiting tickets not refreshed for this long are reaped.
    pub dead_time: Duration,

    /// Lease of a working ticket, measured from its election.
    pub max_working_time: Duration,

    /// Minimum time between two sweeps triggered by `GetTickets`.
    pub sweep_throttle: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            dead_time: Duration::from_secs(30),
            max_working_time: Duration::from_secs(120),
            sweep_throttle: Duration::from_secs(10),
        }
    }
}
