//! Target platforms and their naming conventions.
//!
//! Every platform a release can target carries three conventions used across
//! the pipeline and the updater:
//! - the compiler target identifier passed to the external build step
//! - the executable or bundle name the build produces
//! - the asset names (and content types) published for it, which the updater
//!   uses to find its own download

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// One of the fixed set of desktop platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTarget {
    /// Windows (x86_64)
    Windows,
    /// macOS (universal `.app` bundle)
    #[serde(alias = "mac")]
    MacOS,
    /// Linux (x86_64)
    Linux,
}

/// Kind of a published asset, which decides how the updater installs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Zip archive extracted over the installation directory
    Archive,
    /// Mountable disk image (macOS only)
    DiskImage,
}

impl AssetKind {
    /// Content type advertised for this kind of asset.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Archive => "application/zip",
            Self::DiskImage => "application/x-apple-diskimage",
        }
    }
}

impl PlatformTarget {
    /// All platforms, in pipeline processing order.
    pub const ALL: [Self; 3] = [Self::Windows, Self::MacOS, Self::Linux];

    /// Platform of the running process, if it is one deskship releases for.
    #[must_use]
    pub const fn current() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Self::MacOS)
        } else if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else {
            None
        }
    }

    /// Label used in directory and asset names (`App-Mac.zip`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOS => "Mac",
            Self::Linux => "Linux",
        }
    }

    /// Compiler target identifier handed to the external build step.
    #[must_use]
    pub const fn compiler_target(self) -> &'static str {
        match self {
            Self::Windows => "x86_64-pc-windows-msvc",
            Self::MacOS => "universal-apple-darwin",
            Self::Linux => "x86_64-unknown-linux-gnu",
        }
    }

    /// Name of the executable or bundle the build produces for `product`.
    #[must_use]
    pub fn executable_name(self, product: &str) -> String {
        match self {
            Self::Windows => format!("{product}.exe"),
            Self::MacOS => format!("{product}.app"),
            Self::Linux => product.to_string(),
        }
    }

    /// Per-platform build directory name (`App-Windows`).
    #[must_use]
    pub fn build_dir_name(self, product: &str) -> String {
        format!("{product}-{}", self.label())
    }

    /// Archive asset name (`App-Windows.zip`).
    #[must_use]
    pub fn archive_name(self, product: &str) -> String {
        format!("{product}-{}.zip", self.label())
    }

    /// Disk image asset name; only macOS publishes one.
    #[must_use]
    pub fn disk_image_name(self, product: &str) -> Option<String> {
        match self {
            Self::MacOS => Some(format!("{product}-{}.dmg", self.label())),
            _ => None,
        }
    }

    /// Asset names the updater accepts for this platform, in preference order.
    ///
    /// macOS prefers the disk image and falls back to the archive; the other
    /// platforms have exactly one expected name.
    #[must_use]
    pub fn update_asset_candidates(self, product: &str) -> Vec<(String, AssetKind)> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(dmg) = self.disk_image_name(product) {
            candidates.push((dmg, AssetKind::DiskImage));
        }
        candidates.push((self.archive_name(product), AssetKind::Archive));
        candidates
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PlatformTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(Self::Windows),
            "macos" | "mac" | "osx" => Ok(Self::MacOS),
            "linux" => Ok(Self::Linux),
            other => Err(format!("unknown platform '{other}' (expected windows, macos or linux)")),
        }
    }
}

/// Content type for an uploaded release file, derived from its extension.
///
/// ```rust
/// use deskship::platform::content_type_for;
/// use std::path::Path;
///
/// assert_eq!(content_type_for(Path::new("App-Mac.zip")), "application/zip");
/// assert_eq!(content_type_for(Path::new("notes.md")), "application/octet-stream");
/// ```
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "zip" => AssetKind::Archive.content_type(),
        "dmg" => AssetKind::DiskImage.content_type(),
        "exe" => "application/vnd.microsoft.portable-executable",
        "iss" => "text/plain",
        _ => "application/octet-stream",
    }
}
