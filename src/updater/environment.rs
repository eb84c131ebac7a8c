//! Development host detection.
//!
//! Replacing the installation of a binary that was started by `cargo run`
//! (or straight out of `target/debug`) would overwrite the build tree, so the
//! install action is refused there unless explicitly allowed.

use crate::config::UpdaterConfig;
use crate::core::{DeskshipError, Result};
use std::path::Path;

/// Whether the running process looks like a development build.
#[must_use]
pub fn is_development_host() -> bool {
    let launched_by_cargo = std::env::var_os("CARGO").is_some();
    let exe = std::env::current_exe().ok();
    launched_by_cargo || exe.as_deref().is_some_and(is_development_path)
}

/// Whether `exe` sits in a `target/debug` directory.
#[must_use]
pub fn is_development_path(exe: &Path) -> bool {
    let components: Vec<_> = exe.components().map(|c| c.as_os_str()).collect();
    components.windows(2).any(|pair| pair[0] == "target" && pair[1] == "debug")
}

/// Refuse the install action on a development host unless allowed.
///
/// # Errors
///
/// Returns [`DeskshipError::UpdateRefused`] on a development host when
/// `allow_in_development` is off.
pub fn ensure_update_allowed(config: &UpdaterConfig) -> Result<()> {
    if config.allow_in_development || !is_development_host() {
        return Ok(());
    }
    let reason =
        "running from a development build; set allow_in_development to override".to_string();
    tracing::error!("Update refused: {}", reason);
    Err(DeskshipError::UpdateRefused {
        reason,
    })
}
