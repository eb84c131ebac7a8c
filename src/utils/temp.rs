//! Operation-scoped temporary directories.

use super::fs::{ensure_dir, remove_dir_all};
use crate::core::Result;
use std::path::{Path, PathBuf};

/// A uniquely named directory removed when dropped.
///
/// Signing and updating each create one per operation, so temporary files
/// are gone on both success and failure paths. Call [`disarm`](Self::disarm)
/// to hand the directory to something that outlives this process (the swap
/// script).
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
    keep: bool,
}

impl TempDir {
    /// Create `deskship_{prefix}_{uuid}` in the system temporary directory.
    pub fn new(prefix: &str) -> Result<Self> {
        Self::new_in(&std::env::temp_dir(), prefix)
    }

    /// Create `deskship_{prefix}_{uuid}` under `parent`.
    pub fn new_in(parent: &Path, prefix: &str) -> Result<Self> {
        let path = parent.join(format!("deskship_{}_{}", prefix, uuid::Uuid::new_v4()));
        ensure_dir(&path)?;
        Ok(Self {
            path,
            keep: false,
        })
    }

    /// Path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disable cleanup in place.
    pub fn disarm(&mut self) {
        self.keep = true;
    }

    /// Whether cleanup has been disabled.
    #[must_use]
    pub const fn is_kept(&self) -> bool {
        self.keep
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = remove_dir_all(&self.path) {
                tracing::warn!(
                    "Failed to remove temporary directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_on_drop() {
        let temp = TempDir::new("test").unwrap();
        let path = temp.path().to_path_buf();
        std::fs::write(path.join("file.txt"), "data").unwrap();
        assert!(path.is_dir());

        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn test_unique_names() {
        let a = TempDir::new("sign").unwrap();
        let b = TempDir::new("sign").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().to_string_lossy().contains("deskship_sign_"));
    }

    #[test]
    fn test_keep_skips_cleanup() {
        let mut temp = TempDir::new("keep").unwrap();
        let path = temp.path().to_path_buf();
        temp.disarm();
        assert!(temp.is_kept());
        drop(temp);
        assert!(path.is_dir());
        std::fs::remove_dir_all(&path).unwrap();
    }
}
