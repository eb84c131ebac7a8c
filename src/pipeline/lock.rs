//! Cross-process run lock.

use crate::constants::RUN_LOCK_TIMEOUT;
use crate::core::{DeskshipError, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive file lock held for the duration of a run.
///
/// The in-process processing flag stops a second run inside one process;
/// this lock stops a second `deskship` process working on the same output
/// root. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock at `path`, waiting at most the default timeout.
    pub async fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_with_timeout(path, RUN_LOCK_TIMEOUT).await
    }

    /// Acquire the lock at `path`, polling until `wait` runs out.
    ///
    /// A zero `wait` makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::AlreadyRunning`] when another process keeps
    /// the lock past `wait`.
    pub async fn acquire_with_timeout(path: &Path, wait: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let deadline = Instant::now() + wait;
        loop {
            if FileExt::try_lock_exclusive(&file)? {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DeskshipError::AlreadyRunning);
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL.min(deadline - now)).await;
        }

        tracing::debug!("Acquired run lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_second_acquire_times_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".deskship.lock");

        let held = RunLock::acquire(&path).await.unwrap();
        let err = RunLock::acquire_with_timeout(&path, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DeskshipError::AlreadyRunning));

        drop(held);
        RunLock::acquire_with_timeout(&path, Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_wait_fails_at_once_while_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/.deskship.lock");

        let _held = RunLock::acquire(&path).await.unwrap();
        let start = std::time::Instant::now();
        let err = RunLock::acquire_with_timeout(&path, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, DeskshipError::AlreadyRunning));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
