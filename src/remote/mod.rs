//! Remote locking strategy: tickets held by a self-electing coordinator.
//!
//! A [`RemoteLocker`] registers a ticket with the coordinator for its
//! resource and polls until the coordinator marks it working. When no
//! coordinator answers, the participant starts one itself, seeded with the
//! tickets it last saw, and registers it under the discovery key. Only one
//! such bootstrap can win the registration; losers stay clients.
//!
//! # Guarantees
//!
//! Best effort, not linearizable. A coordinator that crashes mid-lease is
//! replaced from a participant's last snapshot, which keeps the holder's
//! ticket working until its lease runs out. Two coordinators can briefly
//! coexist when a live one is mistaken for dead; the registry record decides
//! which one participants converge on.
//!
//! Evicting a record only removes it while it still names the dead address.
//! If a peer re-registers between that check and the removal, the peer's
//! record is put back, but it is missing for that moment: a participant
//! resolving then may bootstrap a second coordinator, whose record wins the
//! restore.
//!
//! A record that answers for another resource (a reused port behind a stale
//! record) is dropped and replaced. With fixed ports the clash is a
//! configuration error and `lock()` fails.

mod locker;


pub use locker::{RemoteLocker, RemoteSettings};
