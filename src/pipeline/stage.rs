//! Pipeline stages and their outcomes.

use serde::Serialize;
use std::fmt;

/// One ordered step of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Pick the version being released.
    AssignVersion,
    /// Run the external compiler for each selected platform.
    Build,
    /// Sign (and optionally notarize) the macOS bundle.
    Sign,
    /// Zip each platform's build output into the release folder.
    Package,
    /// Generate the Windows installer.
    Installer,
    /// Create the release record and upload every release file.
    Publish,
}

impl Stage {
    /// Every stage in execution order.
    pub const ORDER: [Self; 6] = [
        Self::AssignVersion,
        Self::Build,
        Self::Sign,
        Self::Package,
        Self::Installer,
        Self::Publish,
    ];

    /// Human-readable stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AssignVersion => "assign version",
            Self::Build => "build",
            Self::Sign => "sign",
            Self::Package => "package",
            Self::Installer => "installer",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one stage within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum StageOutcome {
    /// The stage completed.
    Succeeded,
    /// The stage was not enabled or does not apply to the selected platforms.
    Skipped,
    /// The stage failed with this message.
    Failed(String),
}

impl StageOutcome {
    /// Whether this outcome stops the run.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
