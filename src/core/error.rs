//! Error handling for deskship
//!
//! This module provides the error taxonomy shared by the release pipeline and
//! the updater, plus user-friendly error reporting for the CLI. The design
//! follows two principles:
//! 1. **Strongly-typed errors** so callers can branch on the failure category
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Configuration**: [`DeskshipError::Configuration`], [`DeskshipError::Validation`],
//!   [`DeskshipError::InvalidRepository`] - fail fast, before any side effect
//! - **External tools**: [`DeskshipError::ExternalTool`], [`DeskshipError::ToolTimeout`],
//!   [`DeskshipError::ToolNotFound`] - abort the current stage with captured output
//! - **Network**: [`DeskshipError::Network`] - carries a [`NetworkErrorKind`] so 401/403/404
//!   can be told apart from rate limiting and server errors
//! - **Integrity**: [`DeskshipError::Integrity`] - empty or corrupt artifacts
//! - **Cancellation**: [`DeskshipError::Cancelled`] - not a failure, a clean stop
//!
//! # Examples
//!
//! ```rust,no_run
//! use deskship::core::{DeskshipError, user_friendly_error};
//!
//! fn publish() -> Result<(), DeskshipError> {
//!     Err(DeskshipError::Configuration {
//!         reason: "publish token is empty".to_string(),
//!     })
//! }
//!
//! if let Err(e) = publish() {
//!     let ctx = user_friendly_error(anyhow::Error::from(e));
//!     ctx.display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Category of a failed release host request.
///
/// The host API answers with a handful of status codes that each call for a
/// different reaction, so they are kept distinct instead of collapsing into a
/// generic "request failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// 401: the token was rejected.
    Unauthorized,
    /// 403: the token lacks permission (or the host throttled without 429).
    Forbidden,
    /// 404: repository, release or asset does not exist (or is private).
    NotFound,
    /// 429: rate limited.
    RateLimited,
    /// Any 5xx response.
    Server(u16),
    /// Any other unexpected status.
    Status(u16),
    /// The request never produced a response (DNS, TLS, connection reset).
    Transport,
}

impl NetworkErrorKind {
    /// Classify an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::Server(status),
            other => Self::Status(other),
        }
    }

    /// Whether a caller may retry the request later with backoff.
    ///
    /// Only rate limiting and server errors qualify; authentication and
    /// not-found answers will not change by asking again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Server(_))
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "authentication failed (401)"),
            Self::Forbidden => write!(f, "access forbidden (403)"),
            Self::NotFound => write!(f, "not found (404)"),
            Self::RateLimited => write!(f, "rate limited (429)"),
            Self::Server(code) => write!(f, "server error ({code})"),
            Self::Status(code) => write!(f, "unexpected status ({code})"),
            Self::Transport => write!(f, "connection failed"),
        }
    }
}

/// The main error type for deskship operations.
///
/// Every failure in the pipeline and the updater is expressed as one of these
/// variants so the orchestrator can record a single human-readable message and
/// the CLI can attach a suggestion.
#[derive(Error, Debug)]
pub enum DeskshipError {
    /// A required setting is missing or malformed.
    #[error("Configuration error: {reason}")]
    Configuration {
        /// What is wrong with the configuration
        reason: String,
    },

    /// Pre-run validation found one or more problems.
    ///
    /// All failures are collected so the user can fix them in one pass.
    #[error("Validation failed: {}", failures.join("; "))]
    Validation {
        /// Individual validation failures, in check order
        failures: Vec<String>,
    },

    /// An external tool could not be located.
    #[error("Required tool '{tool}' was not found")]
    ToolNotFound {
        /// Tool name or configured path
        tool: String,
    },

    /// An external tool exited with a non-zero status.
    #[error(
        "{tool} failed with exit code {}",
        exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
    )]
    ExternalTool {
        /// Tool that was invoked
        tool: String,
        /// Exit status, if the process exited normally
        exit_code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// An external tool did not finish within its time limit.
    #[error("{tool} timed out after {seconds} seconds")]
    ToolTimeout {
        /// Tool that was invoked
        tool: String,
        /// Limit that was exceeded
        seconds: u64,
    },

    /// A release host request failed.
    #[error("Release host request failed: {kind} ({url})")]
    Network {
        /// Failure category
        kind: NetworkErrorKind,
        /// Request URL
        url: String,
        /// Response body or transport error text
        message: String,
    },

    /// A produced or downloaded artifact is empty, truncated or corrupt.
    #[error("Integrity check failed: {reason}")]
    Integrity {
        /// What failed verification
        reason: String,
    },

    /// Cancellation was requested. Not a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// A pipeline run is already in flight.
    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    /// A version string could not be parsed.
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion {
        /// The offending input
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// A repository URL did not yield an owner/repository pair.
    #[error("Cannot derive owner/repository from '{url}'")]
    InvalidRepository {
        /// The configured URL
        url: String,
    },

    /// The newest release has no asset for this platform.
    #[error("Release {version} has no compatible asset (expected one of: {})", expected.join(", "))]
    NoCompatibleAsset {
        /// Version of the release that was inspected
        version: String,
        /// Asset names that would have matched
        expected: Vec<String>,
    },

    /// The update action is not allowed in this environment.
    #[error("Update refused: {reason}")]
    UpdateRefused {
        /// Why the update was refused
        reason: String,
    },

    /// File system error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeskshipError {
    /// Whether the retry helper should try again after this failure.
    ///
    /// Recoverable conditions are the transient ones: a file that is not
    /// visible yet, a lock held by another process, or an archive that failed
    /// verification right after being written. Semantic failures are final.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Integrity { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ResourceBusy
            ),
            Self::ExternalTool { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                stderr.contains("resource busy")
                    || stderr.contains("being used by another process")
                    || stderr.contains("no such file")
                    || stderr.contains("locked")
            }
            _ => false,
        }
    }

    /// Create a network error from a non-success HTTP status.
    pub fn from_status(status: u16, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            kind: NetworkErrorKind::from_status(status),
            url: url.into(),
            message: message.into(),
        }
    }

    /// Captured output of a failed tool, preferring stderr.
    #[must_use]
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Self::ExternalTool { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    Some(stdout.as_str())
                } else {
                    Some(stderr.as_str())
                }
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DeskshipError {
    fn from(error: reqwest::Error) -> Self {
        let url = error.url().map(ToString::to_string).unwrap_or_default();
        match error.status() {
            Some(status) => Self::from_status(status.as_u16(), url, error.to_string()),
            None => Self::Network {
                kind: NetworkErrorKind::Transport,
                url,
                message: error.to_string(),
            },
        }
    }
}

impl From<zip::result::ZipError> for DeskshipError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Integrity {
                reason: other.to_string(),
            },
        }
    }
}

/// Error wrapper that carries a suggestion and details for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: DeskshipError,
    /// Optional suggestion for how to fix the problem
    pub suggestion: Option<String>,
    /// Optional additional detail
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error without suggestion or details.
    #[must_use]
    pub const fn new(error: DeskshipError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let chain_details = || {
        let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        if chain.is_empty() {
            None
        } else {
            Some(chain.join("\n  caused by: "))
        }
    };

    let Some(deskship_error) = error.downcast_ref::<DeskshipError>() else {
        if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
            // Alternate formatting keeps the context naming the file
            let ctx = ErrorContext::new(DeskshipError::Io(std::io::Error::new(
                io_error.kind(),
                format!("{error:#}"),
            )));
            return match io_error.kind() {
                std::io::ErrorKind::PermissionDenied => ctx
                    .with_suggestion("Check file ownership or run with sufficient permissions"),
                std::io::ErrorKind::NotFound => {
                    ctx.with_suggestion("Check that the file or directory exists")
                }
                _ => ctx,
            };
        }

        let mut ctx = ErrorContext::new(DeskshipError::Configuration {
            reason: error.to_string(),
        });
        if let Some(details) = chain_details() {
            ctx = ctx.with_details(details);
        }
        // Plain anyhow errors are usually context strings around a config or IO problem
        if error.to_string().contains("config") {
            ctx = ctx.with_suggestion("Run `deskship validate` to check deskship.toml");
        }
        return ctx;
    };

    create_error_context(deskship_error, chain_details())
}

fn create_error_context(error: &DeskshipError, chain: Option<String>) -> ErrorContext {
    let cloned = clone_error(error);
    let ctx = match error {
        DeskshipError::Validation { failures } => ErrorContext::new(cloned)
            .with_details(failures.join("\n"))
            .with_suggestion("Fix the listed settings in deskship.toml and run again"),
        DeskshipError::ToolNotFound { tool } => ErrorContext::new(cloned)
            .with_suggestion(format!("Install {tool} or set its full path in deskship.toml")),
        DeskshipError::ExternalTool { stdout, stderr, .. } => {
            let output = if stderr.trim().is_empty() { stdout } else { stderr };
            ErrorContext::new(cloned).with_details(output.trim().to_string())
        }
        DeskshipError::ToolTimeout { .. } => ErrorContext::new(cloned)
            .with_suggestion("The tool may be waiting for input; try running it manually"),
        DeskshipError::Network { kind, message, .. } => {
            let ctx = ErrorContext::new(cloned).with_details(message.clone());
            match kind {
                NetworkErrorKind::Unauthorized => ctx.with_suggestion(
                    "Check that the release host token is valid and not expired",
                ),
                NetworkErrorKind::Forbidden => ctx.with_suggestion(
                    "The token needs write access to releases (and actions, for workflow dispatch)",
                ),
                NetworkErrorKind::NotFound => ctx.with_suggestion(
                    "Check the repository URL; private repositories answer 404 without a token",
                ),
                NetworkErrorKind::RateLimited | NetworkErrorKind::Server(_) => {
                    ctx.with_suggestion("The release host is busy; retry in a few minutes")
                }
                _ => ctx.with_suggestion("Check your network connection"),
            }
        }
        DeskshipError::InvalidRepository { .. } => ErrorContext::new(cloned)
            .with_suggestion("Use a URL of the form https://github.com/<owner>/<repo>"),
        DeskshipError::AlreadyRunning => ErrorContext::new(cloned)
            .with_suggestion("Wait for the other run to finish or remove a stale .deskship.lock"),
        DeskshipError::UpdateRefused { .. } => ErrorContext::new(cloned)
            .with_suggestion("Run the installed application instead of a development build"),
        _ => ErrorContext::new(cloned),
    };

    match (chain, ctx.details.is_none()) {
        (Some(chain), true) => ctx.with_details(chain),
        _ => ctx,
    }
}

fn clone_error(error: &DeskshipError) -> DeskshipError {
    match error {
        DeskshipError::Configuration { reason } => DeskshipError::Configuration {
            reason: reason.clone(),
        },
        DeskshipError::Validation { failures } => DeskshipError::Validation {
            failures: failures.clone(),
        },
        DeskshipError::ToolNotFound { tool } => DeskshipError::ToolNotFound { tool: tool.clone() },
        DeskshipError::ExternalTool {
            tool,
            exit_code,
            stdout,
            stderr,
        } => DeskshipError::ExternalTool {
            tool: tool.clone(),
            exit_code: *exit_code,
            stdout: stdout.clone(),
            stderr: stderr.clone(),
        },
        DeskshipError::ToolTimeout { tool, seconds } => DeskshipError::ToolTimeout {
            tool: tool.clone(),
            seconds: *seconds,
        },
        DeskshipError::Network { kind, url, message } => DeskshipError::Network {
            kind: *kind,
            url: url.clone(),
            message: message.clone(),
        },
        DeskshipError::Integrity { reason } => DeskshipError::Integrity {
            reason: reason.clone(),
        },
        DeskshipError::Cancelled => DeskshipError::Cancelled,
        DeskshipError::AlreadyRunning => DeskshipError::AlreadyRunning,
        DeskshipError::InvalidVersion { input, reason } => DeskshipError::InvalidVersion {
            input: input.clone(),
            reason: reason.clone(),
        },
        DeskshipError::InvalidRepository { url } => {
            DeskshipError::InvalidRepository { url: url.clone() }
        }
        DeskshipError::NoCompatibleAsset { version, expected } => {
            DeskshipError::NoCompatibleAsset {
                version: version.clone(),
                expected: expected.clone(),
            }
        }
        DeskshipError::UpdateRefused { reason } => DeskshipError::UpdateRefused {
            reason: reason.clone(),
        },
        DeskshipError::Io(e) => DeskshipError::Io(std::io::Error::new(e.kind(), e.to_string())),
    }
}
