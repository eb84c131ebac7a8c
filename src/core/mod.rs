//! Core types for deskship
//!
//! This module holds the error taxonomy shared by every other module:
//! - [`DeskshipError`] - enumerated failure categories (configuration, external tool,
//!   network, integrity, cancellation)
//! - [`NetworkErrorKind`] - distinguishes 401/403/404/429/5xx answers from the release host
//! - [`ErrorContext`] - user-friendly wrapper with suggestions and details
//! - [`user_friendly_error`] - convert any error into an [`ErrorContext`] for display
//!
//! Library functions return [`Result`]; CLI glue uses `anyhow::Result` and converts at
//! the edge with [`user_friendly_error`].

pub mod error;

pub use error::{DeskshipError, ErrorContext, NetworkErrorKind, user_friendly_error};

/// Result alias used by library code.
pub type Result<T> = std::result::Result<T, DeskshipError>;
