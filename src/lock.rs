//! Cross-process file lock
//!
//! A cooperative lock used to keep two orchestration runs (typically two CI
//! jobs on the same control host) from working on the same manifest at once.
//! Ownership is the existence of a zero-byte marker file next to the guarded
//! resource. A process that dies while holding the lock leaves the marker in
//! place; removing it by hand releases the lock.

use crate::error::{ConvoyError, Result};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Delay between two acquisition attempts
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Marker-file lock guarding `<path>`
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    timeout: Duration,
}

impl FileLock {
    /// Create a lock for the resource at `path`
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Path of the marker file, `<path>.lock`
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Acquire the lock, polling every [`POLL_INTERVAL`] until the timeout
    /// has been exceeded. A timeout too large to represent never expires.
    pub async fn lock(&self) -> Result<()> {
        let lock_path = self.lock_path();
        tracing::debug!("acquiring file lock {}", lock_path.display());

        let deadline = Instant::now().checked_add(self.timeout);
        loop {
            if self.try_lock() {
                tracing::debug!("file lock {} acquired", lock_path.display());
                return Ok(());
            }

            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                return Err(ConvoyError::LockTimeout {
                    lock: lock_path.display().to_string(),
                    resource: self.path.display().to_string(),
                    timeout: self.timeout,
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Single acquisition attempt. Any failure other than the marker being
    /// present is logged and counts as a failed attempt.
    fn try_lock(&self) -> bool {
        let lock_path = self.lock_path();
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
            Err(e) => {
                tracing::debug!("file lock {} attempt failed: {}", lock_path.display(), e);
                false
            }
        }
    }

    /// Release the lock. Best-effort: a missing marker is only logged.
    pub fn unlock(&self) {
        let lock_path = self.lock_path();
        tracing::debug!("release file lock {}", lock_path.display());
        if let Err(e) = std::fs::remove_file(&lock_path) {
            tracing::debug!("error releasing file lock {}: {}", lock_path.display(), e);
        }
    }
}
