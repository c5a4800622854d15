//! Command implementations for execlock.

mod status;

use crate::cli::{ClearArgs, Cli, Command, HoldArgs, ResourceArgs};
use execlock::config::{Config, Strategy};
use execlock::coordinator::{TicketCoordinator, serve};
use execlock::error::{ExecLockError, Result};
use execlock::locker::acquire;
use execlock::registry::discovery_key;
use execlock::{local, open};
use std::sync::Arc;
use std::time::Duration;

/// Load config, apply command-line overrides, and run the command.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Command::Hold(args) => cmd_hold(&config, args),
        Command::Status(args) => status::cmd_status(&config, &args.resource),
        Command::Clear(args) => cmd_clear(&config, args),
        Command::Serve(args) => cmd_serve(&config, args),
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(strategy) = &cli.strategy {
        config.strategy = Strategy::from_str(strategy).ok_or_else(|| {
            ExecLockError::UserError(format!(
                "unknown strategy '{}' (expected 'local' or 'remote')",
                strategy
            ))
        })?;
    }
    if let Some(dir) = &cli.lock_dir {
        config.lock_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn cmd_hold(config: &Config, args: HoldArgs) -> Result<()> {
    let mut locker = open(config, &args.resource)?;

    println!("Waiting for '{}'...", args.resource);
    let guard = acquire(&mut locker)?;
    println!("Acquired '{}'.", guard.resource());

    if args.seconds > 0 {
        std::thread::sleep(Duration::from_secs(args.seconds));
    }

    guard.release()?;
    println!("Released '{}'.", args.resource);
    Ok(())
}

fn cmd_clear(config: &Config, args: ClearArgs) -> Result<()> {
    if !args.force {
        return Err(ExecLockError::UserError(format!(
            "refusing to clear markers without --force flag.\n\n\
             Clearing markers breaks mutual exclusion if a participant is still active.\n\
             Only clear them if you are certain every participant has exited.\n\n\
             To clear the markers, run:\n  execlock clear {} --force",
            args.resource
        )));
    }

    let removed = local::clear_markers(&config.lock_dir, &args.resource)?;
    if removed.is_empty() {
        println!("No markers for '{}'.", args.resource);
        return Ok(());
    }

    println!("Cleared {} marker(s) for '{}':", removed.len(), args.resource);
    for path in removed {
        println!("  {}", path.display());
    }
    Ok(())
}

fn cmd_serve(config: &Config, args: ResourceArgs) -> Result<()> {
    let registry = config.registry();
    let key = discovery_key(&args.resource);

    let Some(listener) = registry.bind(&key)? else {
        let current = registry
            .resolve(&key)?
            .map(|addr| format!(" at {}", addr))
            .unwrap_or_default();
        return Err(ExecLockError::UserError(format!(
            "a coordinator for '{}' is already registered{}",
            args.resource, current
        )));
    };

    let coordinator = TicketCoordinator::new(&args.resource, config.coordinator_settings());
    let handle = serve(
        Arc::new(coordinator),
        listener,
        Some(registry),
        config.remote_settings().rpc_timeout,
    )?;

    println!("Serving '{}' on {}.", key, handle.addr());
    handle.wait();
    Ok(())
}
