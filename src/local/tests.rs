//! Tests for the local marker-file strategy.

use super::*;
use crate::error::ExecLockError;
use crate::fs::atomic_write;
use crate::liveness::{StaticLiveness, local_host};
use crate::locker::{Locker, acquire};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn fast() -> LocalSettings {
    LocalSettings {
        poll_interval: Duration::from_millis(10),
        sweep_every_ticks: 1,
        unlock_cooldown: Duration::ZERO,
    }
}

fn locker(dir: &TempDir, pid: u32, oracle: &StaticLiveness) -> LocalFileLocker<StaticLiveness> {
    LocalFileLocker::new(dir.path(), "build")
        .unwrap()
        .with_settings(fast())
        .with_pid(pid)
        .with_oracle(oracle.clone())
}

fn write_pid_marker(dir: &TempDir, pid: u32, host: &str) {
    let meta = MarkerMetadata::new(pid, host);
    atomic_write(
        dir.path().join(format!("build-{}.pid", pid)),
        meta.to_json().unwrap().as_bytes(),
    )
    .unwrap();
}

#[test]
fn test_uncontended_lock_creates_markers() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();
    let mut l = locker(&dir, 4242, &oracle);

    l.lock().unwrap();
    assert!(l.is_held());

    let lock_path = dir.path().join("build.lock");
    assert!(lock_path.exists());
    assert!(dir.path().join("build-4242.pidlock").exists());
    assert!(dir.path().join("build-4242.pid").exists());

    let meta = MarkerMetadata::from_file(&lock_path).unwrap();
    assert_eq!(meta.pid, 4242);
    assert_eq!(meta.host, local_host());

    l.unlock().unwrap();
    assert!(!l.is_held());
    assert!(!lock_path.exists());
    assert!(!dir.path().join("build-4242.pidlock").exists());
    assert!(!dir.path().join("build-4242.pid").exists());
}

#[test]
fn test_unlock_without_holding_is_rejected() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();
    let mut holder = locker(&dir, 1, &oracle);
    let mut other = locker(&dir, 2, &oracle);

    holder.lock().unwrap();

    let err = other.unlock().unwrap_err();
    assert!(matches!(err, ExecLockError::NotHeld(_)));
    assert!(dir.path().join("build.lock").exists());

    holder.unlock().unwrap();
}

#[test]
fn test_guard_releases_on_drop() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();
    let mut l = locker(&dir, 7, &oracle);

    {
        let guard = acquire(&mut l).unwrap();
        assert_eq!(guard.resource(), "build");
        assert!(dir.path().join("build.lock").exists());
    }

    assert!(!dir.path().join("build.lock").exists());
}

#[test]
fn test_mutual_exclusion_five_participants() {
    let dir = Arc::new(TempDir::new().unwrap());
    let oracle = StaticLiveness::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..5u32)
        .map(|i| {
            let dir = Arc::clone(&dir);
            let oracle = oracle.clone();
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                let mut l = locker(&dir, 5000 + i, &oracle);
                for _ in 0..2 {
                    l.lock().unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(15));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    l.unlock().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("build.lock").exists());
}

#[test]
fn test_dead_holder_is_recovered() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();

    // The holder "crashes": it never unlocks.
    let mut holder = locker(&dir, 1001, &oracle);
    holder.lock().unwrap();

    let (tx, rx) = mpsc::channel();
    let mut waiter = locker(&dir, 1002, &oracle);
    let handle = thread::spawn(move || {
        waiter.lock().unwrap();
        tx.send(()).unwrap();
        waiter
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    oracle.kill(1001);
    rx.recv_timeout(Duration::from_secs(5))
        .expect("waiter should acquire after the holder dies");

    let mut waiter = handle.join().unwrap();
    let owner = MarkerMetadata::from_file(dir.path().join("build.lock")).unwrap();
    assert_eq!(owner.pid, 1002);
    assert!(!dir.path().join("build-1001.pid").exists());
    waiter.unlock().unwrap();
}

#[test]
fn test_oldest_marker_goes_first() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();

    // An older, live participant that has not reached its own poll yet.
    write_pid_marker(&dir, 900, &local_host());
    thread::sleep(Duration::from_millis(50));

    let (tx, rx) = mpsc::channel();
    let mut late = locker(&dir, 901, &oracle);
    let handle = thread::spawn(move || {
        late.lock().unwrap();
        tx.send(()).unwrap();
        late
    });

    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    assert!(!dir.path().join("build.lock").exists());

    std::fs::remove_file(dir.path().join("build-900.pid")).unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    handle.join().unwrap().unlock().unwrap();
}

#[test]
fn test_dead_waiter_marker_is_swept() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();

    write_pid_marker(&dir, 3001, &local_host());
    oracle.kill(3001);
    thread::sleep(Duration::from_millis(20));

    let mut l = locker(&dir, 3002, &oracle);
    l.lock().unwrap();

    assert!(!dir.path().join("build-3001.pid").exists());
    l.unlock().unwrap();
}

#[test]
fn test_foreign_host_markers_are_not_pid_checked() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();

    write_pid_marker(&dir, 3003, "some-other-host");
    oracle.kill(3003);
    thread::sleep(Duration::from_millis(20));

    let (tx, rx) = mpsc::channel();
    let mut l = locker(&dir, 3004, &oracle);
    let handle = thread::spawn(move || {
        l.lock().unwrap();
        tx.send(()).unwrap();
        l
    });

    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    assert!(dir.path().join("build-3003.pid").exists());

    std::fs::remove_file(dir.path().join("build-3003.pid")).unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    handle.join().unwrap().unlock().unwrap();
}

#[test]
fn test_unlock_leaves_lock_marker_of_new_owner() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();
    let mut l = locker(&dir, 11, &oracle);
    l.lock().unwrap();

    // A peer decided we were dead and re-granted the lock.
    let lock_path = dir.path().join("build.lock");
    let usurper = MarkerMetadata::new(12, &local_host());
    atomic_write(&lock_path, usurper.to_json().unwrap().as_bytes()).unwrap();

    l.unlock().unwrap();
    assert!(lock_path.exists());
    assert!(!dir.path().join("build-11.pid").exists());
}

#[test]
fn test_resources_are_independent() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();

    let mut build = locker(&dir, 21, &oracle);
    let mut deploy = LocalFileLocker::new(dir.path(), "build-deploy")
        .unwrap()
        .with_settings(fast())
        .with_pid(22)
        .with_oracle(oracle.clone());

    build.lock().unwrap();
    deploy.lock().unwrap();
    assert!(dir.path().join("build.lock").exists());
    assert!(dir.path().join("build-deploy.lock").exists());

    build.unlock().unwrap();
    deploy.unlock().unwrap();
}

#[test]
fn test_list_and_clear_markers() {
    let dir = TempDir::new().unwrap();
    let oracle = StaticLiveness::new();
    let host = local_host();

    let mut l = locker(&dir, 31, &oracle);
    l.lock().unwrap();
    write_pid_marker(&dir, 32, &host);
    oracle.kill(32);

    let listed = list_markers(dir.path(), "build", &oracle, &host).unwrap();
    let kinds: Vec<MarkerKind> = listed.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![MarkerKind::Lock, MarkerKind::PidLock, MarkerKind::Pid, MarkerKind::Pid]
    );
    assert_eq!(listed[0].pid, Some(31));
    let dead: Vec<u32> = listed
        .iter()
        .filter(|m| m.alive == Some(false))
        .filter_map(|m| m.pid)
        .collect();
    assert_eq!(dead, vec![32]);
    assert!(listed[0].to_string().starts_with("build.lock (lock"));

    let removed = clear_markers(dir.path(), "build").unwrap();
    assert_eq!(removed.len(), 4);
    assert!(
        list_markers(dir.path(), "build", &oracle, &host)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_invalid_resource_name() {
    let dir = TempDir::new().unwrap();
    let err = LocalFileLocker::new(dir.path(), "a/b").unwrap_err();
    assert!(matches!(err, ExecLockError::UserError(_)));
}

#[test]
fn test_remove_marker_tolerates_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("build-77.pid");

    markers::remove_marker(&path);

    write_pid_marker(&dir, 77, &local_host());
    markers::remove_marker(&path);
    assert!(!path.exists());
}
