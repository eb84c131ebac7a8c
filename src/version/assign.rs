//! Version assignment for a pipeline run.

use crate::core::{DeskshipError, Result};
use serde::{Deserialize, Serialize};

/// How a pipeline run picks the version it releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionPolicy {
    /// Increment the patch component of the current version.
    #[default]
    AutoIncrement,
    /// Use the configured explicit version verbatim.
    Explicit,
}

/// Increment the patch component of a `major.minor.patch` version.
///
/// Returns `None` unless the input is exactly three integer components.
///
/// ```rust
/// use deskship::version::bump_patch;
///
/// assert_eq!(bump_patch("1.0.5").as_deref(), Some("1.0.6"));
/// assert_eq!(bump_patch("1.0"), None);
/// ```
#[must_use]
pub fn bump_patch(current: &str) -> Option<String> {
    let parts: Vec<&str> = current.trim().split('.').collect();
    let [major, minor, patch] = parts.as_slice() else {
        return None;
    };

    let major: u64 = major.parse().ok()?;
    let minor: u64 = minor.parse().ok()?;
    let patch: u64 = patch.parse().ok()?;

    Some(format!("{major}.{minor}.{}", patch.checked_add(1)?))
}

/// Pick the version a run releases.
///
/// - Auto-increment bumps the patch component; a current version that is not
///   an integer triple is kept unchanged.
/// - Explicit adopts the given string verbatim; only emptiness is rejected.
///
/// # Errors
///
/// Returns [`DeskshipError::Configuration`] when the explicit version is empty.
pub fn assign_version(policy: VersionPolicy, current: &str, explicit: &str) -> Result<String> {
    match policy {
        VersionPolicy::AutoIncrement => Ok(bump_patch(current).unwrap_or_else(|| {
            tracing::warn!("Version '{current}' is not major.minor.patch; keeping it unchanged");
            current.to_string()
        })),
        VersionPolicy::Explicit => {
            if explicit.trim().is_empty() {
                return Err(DeskshipError::Configuration {
                    reason: "explicit version is empty".to_string(),
                });
            }
            Ok(explicit.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_patch() {
        assert_eq!(bump_patch("1.0.5").as_deref(), Some("1.0.6"));
        assert_eq!(bump_patch("0.9.99").as_deref(), Some("0.9.100"));
        assert_eq!(bump_patch("1.0"), None);
        assert_eq!(bump_patch("1.0.0.0"), None);
        assert_eq!(bump_patch("1.0.x"), None);
    }

    #[test]
    fn test_auto_increment_keeps_non_triple() {
        assert_eq!(assign_version(VersionPolicy::AutoIncrement, "1.0", "").unwrap(), "1.0");
        assert_eq!(
            assign_version(VersionPolicy::AutoIncrement, "1.0.5", "9.9.9").unwrap(),
            "1.0.6"
        );
    }

    #[test]
    fn test_explicit_is_verbatim() {
        assert_eq!(
            assign_version(VersionPolicy::Explicit, "1.0.5", "2.0.0-rc1").unwrap(),
            "2.0.0-rc1"
        );
        assert!(assign_version(VersionPolicy::Explicit, "1.0.5", "  ").is_err());
    }

    #[test]
    fn test_policy_deserializes_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: VersionPolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"auto-increment\"").unwrap();
        assert_eq!(w.policy, VersionPolicy::AutoIncrement);
        let w: Wrapper = toml::from_str("policy = \"explicit\"").unwrap();
        assert_eq!(w.policy, VersionPolicy::Explicit);
    }
}
