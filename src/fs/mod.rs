//! Filesystem utilities for execlock.
//!
//! Marker files and registry records are shared between independent
//! processes, so every write here is all-or-nothing: a reader either sees the
//! complete content or no file at all.

pub mod atomic;

pub use atomic::{atomic_write, create_exclusive};
