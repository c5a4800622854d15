//! CLI argument parsing for execlock.
//!
//! Uses clap derive macros for declarative argument definitions. This module
//! defines the command structure; implementations are in `commands`.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// execlock: cross-process global execution lock.
///
/// Serializes access to a shared resource between independent processes,
/// either through marker files in a shared directory (`local`) or through a
/// self-electing ticket coordinator (`remote`).
#[derive(Parser, Debug)]
#[command(name = "execlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a YAML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured strategy (local or remote).
    #[arg(long, global = true)]
    pub strategy: Option<String>,

    /// Override the shared lock directory.
    #[arg(long, global = true)]
    pub lock_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire a resource, hold it, then release it.
    Hold(HoldArgs),

    /// Show markers (local) or tickets (remote) for a resource.
    Status(ResourceArgs),

    /// Remove every local marker of a resource.
    ///
    /// Requires --force: only clear markers when every participant is gone.
    Clear(ClearArgs),

    /// Host the ticket coordinator for a resource in the foreground.
    Serve(ResourceArgs),
}

/// Arguments for the `hold` command.
#[derive(Parser, Debug)]
pub struct HoldArgs {
    /// Resource name.
    pub resource: String,

    /// Seconds to hold the lock before releasing it.
    #[arg(short, long, default_value_t = 0)]
    pub seconds: u64,
}

/// A single resource name.
#[derive(Parser, Debug)]
pub struct ResourceArgs {
    /// Resource name.
    pub resource: String,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Resource name.
    pub resource: String,

    /// Confirm clearing.
    #[arg(long, action = ArgAction::SetTrue)]
    pub force: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
