//! Filesystem-only locking strategy.
//!
//! Participants sharing a directory coordinate through three kinds of marker
//! files per resource (see [`markers`] for the layout). Mutual exclusion rests
//! on the exclusive create of the lock marker; fairness on PID marker arrival
//! order; crash recovery on the periodic sweep consulting a
//! [`LivenessOracle`](crate::liveness::LivenessOracle).
//!
//! # Failure semantics
//!
//! Marker deletion failures are logged, not retried. The next sweep (by this
//! or any other participant) reconciles the directory.
//!
//! # Known weak point
//!
//! Arrival order is the PID marker's mtime. Participants on a network
//! filesystem need agreeing clocks, and mtime granularity can produce ties
//! (broken by lowest pid).

mod locker;
pub mod markers;
mod metadata;

#[cfg(test)]
mod tests;

pub use locker::{LocalFileLocker, LocalSettings};
pub use markers::{MarkerInfo, MarkerKind, clear_markers, list_markers};
pub use metadata::MarkerMetadata;
