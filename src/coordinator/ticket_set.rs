//! The per-resource ticket set and its sweep/election procedure.
//!
//! Pure state machine: no locking, no clock, no I/O. The caller passes
//! `now` and a dead-pid predicate and serializes access.

use super::CoordinatorSettings;
use crate::ticket::{Millis, Ticket};
use std::collections::HashMap;
use std::time::Duration;

/// What one sweep changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SweepReport {
    /// Waiters that stopped refreshing.
    pub reaped: Vec<Ticket>,
    /// Working ticket whose lease ran out.
    pub expired: Option<Ticket>,
    /// Tickets of processes known dead on this host.
    pub dead: Vec<Ticket>,
    /// Ticket newly marked working.
    pub elected: Option<Ticket>,
}

#[derive(Debug, Default)]
pub(crate) struct TicketSet {
    tickets: HashMap<String, Ticket>,
    last_sweep: Option<Millis>,
}

fn millis(d: Duration) -> Millis {
    Millis::try_from(d.as_millis()).unwrap_or(Millis::MAX)
}

impl TicketSet {
    /// Start from tickets known to a previous coordinator.
    ///
    /// Waiters get a fresh `last_active` so they are not reaped before they
    /// can reach the new coordinator. A working ticket keeps its grant time,
    /// so its lease is not extended; if several claim to be working, only
    /// the oldest keeps the flag.
    pub fn seeded(tickets: impl IntoIterator<Item = Ticket>, now: Millis) -> Self {
        let mut set = Self::default();
        let mut seeded: Vec<Ticket> = tickets.into_iter().collect();
        seeded.sort();

        let mut have_working = false;
        for mut ticket in seeded {
            if ticket.working && !have_working {
                have_working = true;
            } else {
                ticket.working = false;
                ticket.last_active = now;
            }
            set.tickets.entry(ticket.id.clone()).or_insert(ticket);
        }
        set
    }

    /// Insert `ticket` if new, else refresh the stored copy.
    ///
    /// Callers cannot grant themselves: new tickets always start waiting.
    /// A working ticket's `last_active` is its grant time and is left alone.
    pub fn upsert(&mut self, ticket: &Ticket, now: Millis) {
        match self.tickets.get_mut(&ticket.id) {
            Some(stored) => {
                if !stored.working {
                    stored.last_active = now;
                }
            }
            None => {
                let mut fresh = ticket.clone();
                fresh.working = false;
                fresh.last_active = now;
                self.tickets.insert(fresh.id.clone(), fresh);
            }
        }
    }

    /// Whether the throttle window since the last sweep has passed.
    pub fn sweep_due(&self, now: Millis, throttle: Duration) -> bool {
        match self.last_sweep {
            None => true,
            Some(last) => now.saturating_sub(last) >= millis(throttle),
        }
    }

    /// Reap, expire, prune dead pids, then elect.
    pub fn sweep(
        &mut self,
        now: Millis,
        settings: &CoordinatorSettings,
        is_dead: impl Fn(&Ticket) -> bool,
    ) -> SweepReport {
        self.last_sweep = Some(now);
        let mut report = SweepReport::default();

        let dead_time = millis(settings.dead_time);
        let stale: Vec<String> = self
            .tickets
            .values()
            .filter(|t| !t.working && now.saturating_sub(t.last_active) > dead_time)
            .map(|t| t.id.clone())
            .collect();
        report.reaped = self.remove_all(&stale);

        let lease = millis(settings.max_working_time);
        let expired = self
            .tickets
            .values()
            .find(|t| t.working && now.saturating_sub(t.last_active) > lease)
            .map(|t| t.id.clone());
        if let Some(id) = expired {
            report.expired = self.tickets.remove(&id);
        }

        let dead: Vec<String> = self
            .tickets
            .values()
            .filter(|t| is_dead(t))
            .map(|t| t.id.clone())
            .collect();
        report.dead = self.remove_all(&dead);

        report.elected = self.elect(now);
        report
    }

    /// Mark the oldest ticket working if nobody is.
    fn elect(&mut self, now: Millis) -> Option<Ticket> {
        if self.working().is_some() {
            return None;
        }
        let next = self.tickets.values().min()?.id.clone();
        let ticket = self.tickets.get_mut(&next)?;
        ticket.working = true;
        ticket.last_active = now;
        Some(ticket.clone())
    }

    /// Remove `ticket` if it is the working one.
    pub fn end_work(&mut self, ticket: &Ticket) -> Option<Ticket> {
        let is_working = self
            .tickets
            .get(&ticket.id)
            .is_some_and(|stored| stored.working);
        if is_working {
            self.tickets.remove(&ticket.id)
        } else {
            None
        }
    }

    pub fn working(&self) -> Option<&Ticket> {
        self.tickets.values().find(|t| t.working)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// All tickets in election order.
    pub fn snapshot(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self.tickets.values().cloned().collect();
        tickets.sort();
        tickets
    }

    fn remove_all(&mut self, ids: &[String]) -> Vec<Ticket> {
        let mut removed: Vec<Ticket> = ids
            .iter()
            .filter_map(|id| self.tickets.remove(id))
            .collect();
        removed.sort();
        removed
    }
}
