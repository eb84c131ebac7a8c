//! Client-side self-update.
//!
//! [`UpdateResolver`] runs inside a deployed application. It asks the release
//! host for the newest release that is not a prerelease, compares it with the
//! running version, and picks the asset published for this platform (on
//! macOS the disk image when there is one, otherwise the zip archive).
//!
//! Installing downloads the asset into a temporary file, verifies it, and
//! hands it to the [`Installer`]:
//!
//! - archives are extracted to a staging directory and swapped in by a
//!   detached script once this process has exited
//! - disk images are mounted and their bundle copied into the applications
//!   directory, falling back to opening the volume for a manual install
//!
//! Either the old installation keeps running unchanged, or a fully staged
//! replacement is swapped in. Progress is visible as an [`UpdateState`].
//!
//! [`UpdateChecker`] puts a JSON cache in front of the resolver so
//! applications can check on every start without hitting the host each time.

mod cache;
mod download;
mod environment;
mod install;
mod resolver;
mod state;

pub use cache::{CACHE_FILE, UpdateChecker, VersionCheckCache};
pub use download::{CHECKSUMS_ASSET, DownloadedAsset, download_asset, parse_checksums};
pub use environment::{ensure_update_allowed, is_development_host, is_development_path};
pub use install::{InstallOutcome, InstallTools, Installer, StagedSwap};
pub use resolver::{CheckOutcome, UpdateCandidate, UpdateResolver};
pub use state::{StateHandle, UpdateState};
