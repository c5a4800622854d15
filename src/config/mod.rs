//! Configuration model for execlock.
//!
//! `Config` is read from a YAML file. It supports forward-compatible parsing
//! (unknown fields are ignored), defaults for every field, and validation of
//! interval values. Components never see YAML: `Config` hands each of them a
//! plain settings value.

mod model;
mod operations;
pub mod types;

#[cfg(test)]
mod tests;

pub use model::Config;
pub use types::{RegistryKind, Strategy};
