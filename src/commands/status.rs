//! `execlock status`: what is holding or waiting for a resource.

use execlock::config::{Config, Strategy};
use execlock::error::Result;
use execlock::liveness::{OsLiveness, local_host};
use execlock::local::{self, MarkerKind};
use execlock::registry::discovery_key;
use execlock::remote::RemoteLocker;

pub fn cmd_status(config: &Config, resource: &str) -> Result<()> {
    match config.strategy {
        Strategy::Local => local_status(config, resource),
        Strategy::Remote => remote_status(config, resource),
    }
}

fn local_status(config: &Config, resource: &str) -> Result<()> {
    let markers = local::list_markers(&config.lock_dir, resource, &OsLiveness, &local_host())?;

    if markers.is_empty() {
        println!("No markers for '{}' in {}.", resource, config.lock_dir.display());
        return Ok(());
    }

    let holder = markers.iter().find(|m| m.kind == MarkerKind::Lock);
    match holder.and_then(|m| m.metadata.as_ref()) {
        Some(meta) => println!("'{}' is held by {} (pid {}).", resource, meta.owner, meta.pid),
        None if holder.is_some() => println!("'{}' is held (owner unknown).", resource),
        None => println!("'{}' is free.", resource),
    }
    println!();

    for marker in &markers {
        println!("  {}", marker);
    }

    let dead = markers.iter().filter(|m| m.alive == Some(false)).count();
    if dead > 0 {
        println!();
        println!(
            "Note: {} marker(s) belong to dead processes; the next waiter's sweep removes them.",
            dead
        );
    }
    Ok(())
}

fn remote_status(config: &Config, resource: &str) -> Result<()> {
    let registry = config.registry();
    let Some(addr) = registry.resolve(&discovery_key(resource))? else {
        println!("No coordinator registered for '{}'.", resource);
        return Ok(());
    };

    let locker = RemoteLocker::new(resource, registry, config.remote_settings())?;
    let tickets = locker.query()?;
    println!("Coordinator for '{}' at {}:", resource, addr);
    if tickets.is_empty() {
        println!("  no tickets");
    }
    for ticket in &tickets {
        println!("  {}", ticket);
    }
    Ok(())
}
