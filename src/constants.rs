//! Global constants used throughout the deskship codebase.
//!
//! This module contains timeout durations, retry parameters, naming
//! conventions and other values that are shared across the pipeline and
//! the updater. Defining them centrally makes magic numbers discoverable.

use std::time::Duration;

/// Number of attempts the retry helper makes for recoverable failures.
pub const RETRY_ATTEMPTS: usize = 3;

/// Fixed delay between retry attempts (1 second).
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default timeout for external tool invocations without a specific limit (10 minutes).
///
/// Compilers and installer compilers can legitimately run for a long time,
/// so this is only a guard against processes that never exit.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for keychain operations used during identity extraction (30 seconds).
pub const KEYCHAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single `codesign` invocation over a bundle (120 seconds).
pub const CODESIGN_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for signature verification (60 seconds).
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for stapling a notarization ticket (60 seconds).
pub const STAPLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for notarization submission with `--wait`.
///
/// The remote service usually answers within a few minutes; anything beyond
/// this is treated as a notarization failure, which is best-effort anyway.
pub const NOTARIZE_TIMEOUT: Duration = Duration::from_secs(1800);

/// How long to wait for the cross-process run lock before reporting a concurrent run.
pub const RUN_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Name of the lock file created under the output root while a run is active.
pub const RUN_LOCK_FILE: &str = ".deskship.lock";

/// Maximum number of top-level inputs accepted by the remote workflow dispatch API.
pub const MAX_DISPATCH_INPUTS: usize = 5;

/// Default release host API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default workflow file triggered for remote disk image creation.
pub const DEFAULT_DISK_IMAGE_WORKFLOW: &str = "build-dmg.yml";

/// Default git ref the disk image workflow runs against.
pub const DEFAULT_WORKFLOW_REF: &str = "main";

/// Number of retries for idempotent release host reads that hit 429 or 5xx.
pub const HOST_READ_RETRIES: u32 = 3;

/// First backoff delay for release host read retries; doubles per retry.
pub const HOST_RETRY_BASE: Duration = Duration::from_millis(500);

/// Connect timeout for release host requests.
pub const HOST_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// User agent sent with every release host request.
pub const USER_AGENT: &str = concat!("deskship/", env!("CARGO_PKG_VERSION"));

/// Prefix for status strings that report a failure.
///
/// Presentation layers match on this prefix to switch to an error style.
pub const STATUS_ERROR_MARKER: &str = "❌ ";

/// Directory (under the output root) holding per-platform build output.
pub const BUILDS_DIR: &str = "Builds";

/// Directory (under the output root) holding per-version release files.
pub const RELEASES_DIR: &str = "Releases";

/// Delay before a mounted disk image is detached when manual installation is needed (5 minutes).
pub const UNMOUNT_DELAY: Duration = Duration::from_secs(300);

/// Seconds the swap script waits between checks for the old process to exit.
pub const SWAP_POLL_SECONDS: u64 = 1;

/// Default interval between automatic update checks (24 hours).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 86400;

/// Timeout for mounting or detaching a disk image during an update (2 minutes).
pub const DISK_IMAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Standard location of installed macOS applications.
pub const APPLICATIONS_DIR: &str = "/Applications";
