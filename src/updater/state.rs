//! Update cycle states.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Where an update cycle currently is.
///
/// ```text
/// Idle → Checking → {UpToDate | UpdateAvailable}
///      → Downloading → Extracting → Installing → Restarting
/// ```
///
/// Any failure moves to [`Error`](Self::Error). Nothing is resumed across
/// process restarts; a new cycle always starts from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateState {
    /// No cycle in progress.
    #[default]
    Idle,
    /// Querying the release host.
    Checking,
    /// The running version is the newest eligible one.
    UpToDate,
    /// A newer release with a compatible asset exists.
    UpdateAvailable,
    /// Fetching the asset.
    Downloading,
    /// Unpacking or mounting the asset.
    Extracting,
    /// Copying the new installation into place.
    Installing,
    /// Waiting for this process to exit so the new one can start.
    Restarting,
    /// The cycle failed; the running installation is unchanged.
    Error,
}

impl UpdateState {
    /// Whether the cycle has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::UpToDate | Self::Restarting | Self::Error)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Checking => "checking for updates",
            Self::UpToDate => "up to date",
            Self::UpdateAvailable => "update available",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Installing => "installing",
            Self::Restarting => "restarting",
            Self::Error => "error",
        };
        f.write_str(text)
    }
}

/// Shared, cloneable handle on the current [`UpdateState`].
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<UpdateState>>,
}

impl StateHandle {
    /// Current state.
    #[must_use]
    pub fn get(&self) -> UpdateState {
        *self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: UpdateState) {
        let mut current = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *current != state {
            tracing::debug!("Updater: {} -> {}", *current, state);
            *current = state;
        }
    }
}
