//! Atomic filesystem operations for execlock.
//!
//! # Implementation Strategy
//!
//! Both operations write content to a uniquely named temporary file in the
//! same directory and sync it to disk first. Then:
//!
//! - [`atomic_write`] renames the temp file over the target (replace).
//! - [`create_exclusive`] hard-links the temp file to the target, which fails
//!   with `AlreadyExists` if the target is present (create-if-absent). This is
//!   the exclusive-create primitive lock markers and registry records rely on.
//!
//! Source and destination must be on the same filesystem. On crash, a
//! temporary file named `.{filename}.{pid}.{nonce}.tmp` may remain; it never
//! matches a marker or record name, so it is ignored by every scanner.

use crate::error::{ExecLockError, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file, replacing any existing content.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        ExecLockError::IoError(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e
        ))
    })?;

    sync_parent(path);
    Ok(())
}

/// Create `path` with `content` only if it does not exist yet.
///
/// Returns `Ok(true)` when this call created the file and `Ok(false)` when
/// another writer got there first. The file appears with its full content or
/// not at all.
pub fn create_exclusive<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<bool> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);

    match linked {
        Ok(()) => {
            sync_parent(path);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) if e.kind() == ErrorKind::Unsupported => create_new_fallback(path, content),
        Err(e) => Err(ExecLockError::IoError(format!(
            "failed to create '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Plain `create_new` for filesystems without hard links.
fn create_new_fallback(path: &Path, content: &[u8]) -> Result<bool> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(ExecLockError::IoError(format!(
                "failed to create '{}': {}",
                path.display(),
                e
            )));
        }
    };

    file.write_all(content)
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(path);
            ExecLockError::IoError(format!("failed to write '{}': {}", path.display(), e))
        })?;

    Ok(true)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            ExecLockError::IoError(format!(
                "failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Generate a temporary file path in the same directory as the target.
///
/// The name carries the pid and a random nonce so concurrent writers in the
/// same directory never share a temp file.
fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExecLockError::UserError("invalid file path".to_string()))?;

    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let temp_name = format!(".{}.{}.{}.tmp", filename, std::process::id(), &nonce[..12]);
    Ok(parent.join(temp_name))
}

/// Write content to a file and sync to disk.
fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        ExecLockError::IoError(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        ExecLockError::IoError(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        ExecLockError::IoError(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    #[cfg(not(unix))]
    let _ = path;
}
