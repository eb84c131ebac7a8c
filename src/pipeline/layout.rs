//! Where builds and releases are written below the output root.

use crate::constants::{BUILDS_DIR, RELEASES_DIR, RUN_LOCK_FILE};
use crate::platform::PlatformTarget;
use std::path::PathBuf;

/// Paths of everything a run writes below the output root.
///
/// ```text
/// {root}/Builds/{Product}-{Platform}/
/// {root}/Releases/v{version}/{Product}-{Platform}.zip
/// {root}/Releases/v{version}/{Product}-Mac.dmg
/// {root}/Releases/v{version}/{Product}-Installer.exe
/// {root}/Releases/v{version}/{Product}-Installer.iss
/// ```
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    product: String,
}

impl OutputLayout {
    /// Layout for `product` under `root`.
    pub fn new(root: impl Into<PathBuf>, product: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            product: product.into(),
        }
    }

    /// `Builds/`
    #[must_use]
    pub fn builds_dir(&self) -> PathBuf {
        self.root.join(BUILDS_DIR)
    }

    /// `Builds/{Product}-{Platform}/`
    #[must_use]
    pub fn build_dir(&self, platform: PlatformTarget) -> PathBuf {
        self.builds_dir().join(platform.build_dir_name(&self.product))
    }

    /// `Releases/v{version}/`
    #[must_use]
    pub fn release_dir(&self, version: &str) -> PathBuf {
        self.root.join(RELEASES_DIR).join(crate::version::tag_for(version))
    }

    /// `Releases/v{version}/{Product}-{Platform}.zip`
    #[must_use]
    pub fn archive_path(&self, version: &str, platform: PlatformTarget) -> PathBuf {
        self.release_dir(version).join(platform.archive_name(&self.product))
    }

    /// `Releases/v{version}/{Product}-Installer.exe`
    #[must_use]
    pub fn installer_path(&self, version: &str) -> PathBuf {
        self.release_dir(version).join(format!("{}-Installer.exe", self.product))
    }

    /// `Releases/v{version}/{Product}-Installer.iss`
    #[must_use]
    pub fn installer_script_path(&self, version: &str) -> PathBuf {
        self.release_dir(version).join(format!("{}-Installer.iss", self.product))
    }

    /// Cross-process run lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(RUN_LOCK_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = OutputLayout::new("/out", "App");
        assert_eq!(layout.build_dir(PlatformTarget::MacOS), PathBuf::from("/out/Builds/App-Mac"));
        assert_eq!(
            layout.archive_path("1.0.6", PlatformTarget::Windows),
            PathBuf::from("/out/Releases/v1.0.6/App-Windows.zip")
        );
        assert_eq!(
            layout.installer_path("1.0.6"),
            PathBuf::from("/out/Releases/v1.0.6/App-Installer.exe")
        );
        assert_eq!(
            layout.installer_script_path("1.0.6"),
            PathBuf::from("/out/Releases/v1.0.6/App-Installer.iss")
        );
        assert_eq!(layout.lock_path(), PathBuf::from("/out/.deskship.lock"));
    }
}
