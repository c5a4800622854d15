//! `TicketCoordinator`: the single authority for one resource.

use super::CoordinatorSettings;
use super::ticket_set::{SweepReport, TicketSet};
use crate::liveness::{LivenessOracle, OsLiveness, local_host};
use crate::registry::discovery_key;
use crate::rpc::{Request, Response};
use crate::ticket::{Millis, Ticket, now_millis};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Holds every ticket for one resource and runs the election.
///
/// All mutation goes through one mutex; concurrent RPCs queue on it, which
/// makes each upsert-sweep-elect pass atomic.
pub struct TicketCoordinator {
    resource: String,
    key: String,
    settings: CoordinatorSettings,
    oracle: Arc<dyn LivenessOracle>,
    host: String,
    state: Mutex<TicketSet>,
}

impl TicketCoordinator {
    pub fn new(resource: &str, settings: CoordinatorSettings) -> Self {
        Self {
            resource: resource.to_string(),
            key: discovery_key(resource),
            settings,
            oracle: Arc::new(OsLiveness),
            host: local_host(),
            state: Mutex::new(TicketSet::default()),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn LivenessOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Host whose pids this coordinator may check.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Replace the ticket set with tickets handed over from a previous coordinator.
    pub fn seeded(self, tickets: impl IntoIterator<Item = Ticket>) -> Self {
        self.seeded_at(tickets, now_millis())
    }

    pub fn seeded_at(self, tickets: impl IntoIterator<Item = Ticket>, now: Millis) -> Self {
        *self.state.lock() = TicketSet::seeded(tickets, now);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Register or refresh `ticket`, run the sweep if due, return all tickets.
    ///
    /// The caller holds the lock iff its id comes back with `working = true`.
    pub fn get_tickets(&self, ticket: &Ticket) -> Vec<Ticket> {
        self.get_tickets_at(ticket, now_millis())
    }

    pub fn get_tickets_at(&self, ticket: &Ticket, now: Millis) -> Vec<Ticket> {
        let mut state = self.state.lock();
        state.upsert(ticket, now);
        if state.sweep_due(now, self.settings.sweep_throttle) {
            let report = state.sweep(now, &self.settings, |t| self.is_dead(t));
            self.log_sweep(&report);
        }
        state.snapshot()
    }

    /// Release `ticket` if it is the working one and elect the next.
    ///
    /// Any other ticket is a no-op, which makes duplicate releases safe.
    pub fn end_work(&self, ticket: &Ticket) {
        self.end_work_at(ticket, now_millis());
    }

    pub fn end_work_at(&self, ticket: &Ticket, now: Millis) {
        let mut state = self.state.lock();
        match state.end_work(ticket) {
            Some(released) => {
                info!(resource = %self.resource, ticket = %released.id, "work ended");
                let report = state.sweep(now, &self.settings, |t| self.is_dead(t));
                self.log_sweep(&report);
            }
            None => {
                debug!(
                    resource = %self.resource,
                    ticket = %ticket.id,
                    "end_work for a ticket that is not working, ignoring"
                );
            }
        }
    }

    /// Current tickets in election order, without side effects.
    pub fn snapshot(&self) -> Vec<Ticket> {
        self.state.lock().snapshot()
    }

    pub fn working(&self) -> Option<Ticket> {
        self.state.lock().working().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Answer one wire request.
    pub fn handle(&self, request: Request) -> Response {
        if request.key() != self.key {
            return Response::WrongKey {
                serving: self.key.clone(),
            };
        }
        match request {
            Request::GetTickets { ticket, .. } => Response::Tickets {
                tickets: self.get_tickets(&ticket),
            },
            Request::EndWork { ticket, .. } => {
                self.end_work(&ticket);
                Response::Done
            }
            Request::Snapshot { .. } => Response::Tickets {
                tickets: self.snapshot(),
            },
        }
    }

    /// Host-local pid check; tickets from other hosts are exempt.
    fn is_dead(&self, ticket: &Ticket) -> bool {
        ticket.is_on_host(&self.host) && !self.oracle.is_alive(ticket.pid)
    }

    fn log_sweep(&self, report: &SweepReport) {
        for ticket in &report.reaped {
            info!(resource = %self.resource, ticket = %ticket.id, pid = ticket.pid, "reaped abandoned ticket");
        }
        if let Some(ticket) = &report.expired {
            warn!(resource = %self.resource, ticket = %ticket.id, pid = ticket.pid, "working lease expired, evicting holder");
        }
        for ticket in &report.dead {
            info!(resource = %self.resource, ticket = %ticket.id, pid = ticket.pid, "removed ticket of dead process");
        }
        if let Some(ticket) = &report.elected {
            info!(resource = %self.resource, ticket = %ticket.id, pid = ticket.pid, "elected working ticket");
        }
    }
}

impl std::fmt::Debug for TicketCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketCoordinator")
            .field("key", &self.key)
            .field("settings", &self.settings)
            .field("host", &self.host)
            .finish()
    }
}
