//! Marker metadata stored inside every local marker file.

use crate::error::{ExecLockError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// JSON content of PID, PID-lock, and lock markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerMetadata {
    /// Owner of the marker (e.g., `user@HOST`).
    pub owner: String,

    /// Host the owning process runs on; pids are only meaningful there.
    pub host: String,

    /// Process ID of the owner.
    pub pid: u32,

    /// Timestamp when the marker was written (RFC3339).
    pub created_at: DateTime<Utc>,
}

impl MarkerMetadata {
    /// Create new metadata with the current timestamp.
    pub fn new(pid: u32, host: &str) -> Self {
        Self {
            owner: get_owner_string(host),
            host: host.to_string(),
            pid,
            created_at: Utc::now(),
        }
    }

    /// Parse marker metadata from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ExecLockError::IoError(format!(
                "failed to read marker '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ExecLockError::IoError(format!(
                "failed to parse marker '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Serialize marker metadata to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            ExecLockError::IoError(format!("failed to serialize marker metadata: {}", e))
        })
    }

    /// Calculate the age of the marker.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds.max(0))
        }
    }
}

/// Get the owner string for marker metadata.
fn get_owner_string(host: &str) -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
