//! Release version handling.
//!
//! Release versions are dot-separated non-negative integers (`1.2.3`). Unlike
//! full semantic versioning there are no pre-release or build segments, and
//! missing trailing components compare as zero, so `1.2` and `1.2.0` are the
//! same version.
//!
//! # Examples
//!
//! ```rust
//! use deskship::version::{Version, is_newer};
//!
//! # fn example() -> deskship::core::Result<()> {
//! assert!(is_newer("1.2.3", "1.2.2")?);
//! assert!(!is_newer("1.2", "1.2.0")?);
//!
//! let tag: Version = "v2.0.0".parse()?;
//! assert_eq!(tag.to_string(), "2.0.0");
//! # Ok(())
//! # }
//! ```

mod assign;

pub use assign::{VersionPolicy, assign_version, bump_patch};

use crate::core::{DeskshipError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed release version.
///
/// Equality and ordering are component-wise numeric with missing trailing
/// components treated as `0`.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Parse a version string, accepting an optional leading `v` or `V`.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::InvalidVersion`] for empty input, empty
    /// components (`1..2`) or non-numeric components (`1.x.0`).
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

        if body.is_empty() {
            return Err(DeskshipError::InvalidVersion {
                input: input.to_string(),
                reason: "version is empty".to_string(),
            });
        }

        let components = body
            .split('.')
            .map(|part| {
                if part.is_empty() {
                    return Err(DeskshipError::InvalidVersion {
                        input: input.to_string(),
                        reason: "empty version component".to_string(),
                    });
                }
                part.parse::<u64>().map_err(|_| DeskshipError::InvalidVersion {
                    input: input.to_string(),
                    reason: format!("component '{part}' is not a non-negative integer"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { components })
    }

    /// Number of components as written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false; a parsed version has at least one component.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components as written.
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = DeskshipError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.components.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.components.len().max(other.components.len());
        (0..width)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Whether `candidate` is strictly newer than `current`.
///
/// # Errors
///
/// Returns [`DeskshipError::InvalidVersion`] if either string is malformed.
pub fn is_newer(candidate: &str, current: &str) -> Result<bool> {
    Ok(Version::parse(candidate)? > Version::parse(current)?)
}

/// Release tag for a version (`1.2.3` → `v1.2.3`).
#[must_use]
pub fn tag_for(version: &str) -> String {
    format!("v{}", version.trim_start_matches(['v', 'V']))
}
