//! Release host API client.
//!
//! A thin HTTP client for a GitHub-Releases-style API: create a release,
//! upload assets to it, fetch releases by tag or as a list, trigger a remote
//! workflow, and download assets. Status codes are mapped onto
//! [`NetworkErrorKind`](crate::core::NetworkErrorKind) so callers can tell an
//! invalid token from a missing repository or a throttled request.

mod auth;
mod client;
mod models;
mod repo;

pub use auth::{HeaderStyle, authorization_value, choose_auth_scheme};
pub use client::{DownloadSummary, ReleaseHostClient};
pub use models::{
    CreateReleaseRequest, DispatchInputs, DispatchRequest, Release, ReleaseAsset, SigningParams,
};
pub use repo::RepoRef;
