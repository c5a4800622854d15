//! Ticket: one participant's request for a named lock.
//!
//! Identity is the `id` alone. Equality and hashing ignore the timing fields so
//! refreshing `last_active` never breaks set membership. Ordering is
//! `(created_at, id)`, which is the fairness order used for elections.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Milliseconds since the Unix epoch, the unit of every ticket timestamp.
pub type Millis = i64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Millis {
    Utc::now().timestamp_millis()
}

/// A participant's timestamped request to acquire a named lock.
///
/// Wire shape: `{id, pid, createdAt, lastActive, working}` plus an optional
/// `host`, which lets a coordinator prune tickets of dead processes on its
/// own host. Tickets without a host are never pruned by pid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub pid: u32,
    pub created_at: Millis,
    pub last_active: Millis,
    pub working: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Ticket {
    /// Build a fresh ticket for this process.
    pub fn new(pid: u32, host: Option<String>) -> Self {
        Self::at(uuid::Uuid::new_v4().to_string(), pid, now_millis(), host)
    }

    /// Build a ticket with an explicit id and creation time.
    pub fn at(id: impl Into<String>, pid: u32, created_at: Millis, host: Option<String>) -> Self {
        Self {
            id: id.into(),
            pid,
            created_at,
            last_active: created_at,
            working: false,
            host,
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        to_datetime(self.created_at)
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        to_datetime(self.last_active)
    }

    /// Whether this ticket belongs to a process on `host`.
    pub fn is_on_host(&self, host: &str) -> bool {
        self.host.as_deref() == Some(host)
    }
}

fn to_datetime(millis: Millis) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl PartialEq for Ticket {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Ticket {}

impl Hash for Ticket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.id == other.id {
            return Ordering::Equal;
        }
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (pid {}{}, created {}{})",
            self.id,
            self.pid,
            self.host
                .as_deref()
                .map(|h| format!("@{}", h))
                .unwrap_or_default(),
            self.created().format("%H:%M:%S%.3f"),
            if self.working { ", WORKING" } else { "" }
        )
    }
}
