//! HTTP client for the release host.
//!
//! Every request carries the authorization header chosen by
//! [`authorization_value`](super::auth::authorization_value) when a token is
//! configured. Rate limits and server errors are retried with backoff; other
//! statuses map straight to a [`NetworkErrorKind`](crate::core::NetworkErrorKind).

use super::auth::authorization_value;
use super::models::{CreateReleaseRequest, DispatchRequest, Release, ReleaseAsset};
use super::repo::RepoRef;
use crate::constants::{HOST_CONNECT_TIMEOUT, HOST_READ_RETRIES, HOST_RETRY_BASE, USER_AGENT};
use crate::core::{DeskshipError, NetworkErrorKind, Result};
use crate::platform::content_type_for;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_retry::RetryIf;
use tracing::{debug, info};

const API_ACCEPT: &str = "application/vnd.github+json";
const BINARY_ACCEPT: &str = "application/octet-stream";

/// Byte count and digest of a streamed download.
#[derive(Debug, Clone)]
pub struct DownloadSummary {
    /// Bytes written.
    pub bytes: u64,
    /// `Content-Length` announced by the server, if any.
    pub expected_len: Option<u64>,
    /// Lowercase hex SHA-256 of the written bytes.
    pub sha256: String,
}

/// HTTP client for one repository on the release host.
///
/// Reads (`GET`) that fail with 429 or a 5xx status are retried with doubling
/// delays; writes are sent once so a retry can never create a second release.
/// Every request carries an authorization header when a token is configured,
/// using the scheme picked by [`choose_auth_scheme`](super::choose_auth_scheme).
#[derive(Debug, Clone)]
pub struct ReleaseHostClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    token: Option<String>,
    retry_base: Duration,
}

impl ReleaseHostClient {
    /// Client for `repo` at `api_base`; an empty or blank token means unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Network`] if the HTTP client cannot be built.
    pub fn new(api_base: &str, repo: RepoRef, token: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(HOST_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo,
            token: token.map(str::trim).filter(|t| !t.is_empty()).map(String::from),
            retry_base: HOST_RETRY_BASE,
        })
    }

    /// Client for the repository named by `repository_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::InvalidRepository`] if the URL has no owner/repository pair.
    pub fn for_repository(
        api_base: &str,
        repository_url: &str,
        token: Option<&str>,
    ) -> Result<Self> {
        Self::new(api_base, RepoRef::parse(repository_url)?, token)
    }

    /// Override the first retry delay for reads.
    #[must_use]
    pub const fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Repository this client talks to.
    #[must_use]
    pub const fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn repo_url(&self, suffix: &str) -> String {
        let base = format!("{}/repos/{}/{}", self.api_base, self.repo.owner(), self.repo.repo());
        if suffix.is_empty() {
            base
        } else {
            format!("{base}/{suffix}")
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, authorization_value(token)),
            None => builder,
        }
    }

    fn api_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.authorized(self.http.request(method, url).header(ACCEPT, API_ACCEPT))
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(target: "host", "{} -> {}", url, status);

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(DeskshipError::from_status(status.as_u16(), url, message))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(self.api_request(Method::GET, url), url).await?;
        Ok(response.json::<T>().await?)
    }

    /// GET `url` as JSON, retrying rate limits and server errors.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let base = self.retry_base;
        let delays = (0..HOST_READ_RETRIES).map(move |n| base * 2u32.pow(n));

        RetryIf::spawn(
            delays,
            || self.fetch_json::<T>(url),
            |error: &DeskshipError| {
                let retry =
                    matches!(error, DeskshipError::Network { kind, .. } if kind.is_retryable());
                if retry {
                    debug!(target: "host", "Retrying {} after: {}", url, error);
                }
                retry
            },
        )
        .await
    }

    /// Confirm the repository exists and is visible with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Network`] with `NotFound`, `Unauthorized` or
    /// `Forbidden` so callers can report each case distinctly.
    pub async fn check_repository(&self) -> Result<()> {
        let url = self.repo_url("");
        let _: serde_json::Value = self.get_json(&url).await?;
        Ok(())
    }

    /// All releases, newest first.
    pub async fn list_releases(&self) -> Result<Vec<Release>> {
        let url = format!("{}?per_page=100", self.repo_url("releases"));
        self.get_json(&url).await
    }

    /// Release attached to `tag`, or `None` if there is none.
    pub async fn release_by_tag(&self, tag: &str) -> Result<Option<Release>> {
        let url = self.repo_url(&format!("releases/tags/{tag}"));
        match self.get_json::<Release>(&url).await {
            Ok(release) => Ok(Some(release)),
            Err(DeskshipError::Network {
                kind: NetworkErrorKind::NotFound,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a release record.
    pub async fn create_release(&self, request: &CreateReleaseRequest) -> Result<Release> {
        let url = self.repo_url("releases");
        info!(target: "host", "Creating release {} in {}", request.tag_name, self.repo);
        let response = self
            .send(self.api_request(Method::POST, &url).json(request), &url)
            .await?;
        Ok(response.json::<Release>().await?)
    }

    /// Return the release for `request.tag_name`, creating it only if absent.
    ///
    /// The boolean is `true` when a new release was created. A create that
    /// loses a race with another publisher (422) falls back to the existing
    /// record, so a tag is never created twice.
    pub async fn ensure_release(&self, request: &CreateReleaseRequest) -> Result<(Release, bool)> {
        if let Some(existing) = self.release_by_tag(&request.tag_name).await? {
            info!(
                target: "host",
                "Reusing existing release {} (id {})",
                existing.tag_name,
                existing.id
            );
            return Ok((existing, false));
        }

        match self.create_release(request).await {
            Ok(release) => Ok((release, true)),
            Err(DeskshipError::Network {
                kind: NetworkErrorKind::Status(422),
                url,
                message,
            }) => match self.release_by_tag(&request.tag_name).await? {
                Some(existing) => Ok((existing, false)),
                None => Err(DeskshipError::from_status(422, url, message)),
            },
            Err(e) => Err(e),
        }
    }

    /// Upload `path` to `release`, named after the file.
    pub async fn upload_asset(&self, release: &Release, path: &Path) -> Result<ReleaseAsset> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DeskshipError::Configuration {
                reason: format!("cannot upload {}: no file name", path.display()),
            })?;
        let bytes = tokio::fs::read(path).await?;
        let url = release.upload_base().to_string();

        debug!(target: "host", "Uploading {} ({} bytes) to {}", name, bytes.len(), url);

        let builder = self
            .api_request(Method::POST, &url)
            .query(&[("name", name.as_str())])
            .header(CONTENT_TYPE, content_type_for(path))
            .body(bytes);
        let response = self.send(builder, &url).await?;
        Ok(response.json::<ReleaseAsset>().await?)
    }

    /// Trigger `workflow` with a bounded input set.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Configuration`] before any request is sent if
    /// the inputs exceed the dispatch limit.
    pub async fn dispatch_workflow(&self, workflow: &str, request: &DispatchRequest) -> Result<()> {
        request.inputs.check_bounds()?;
        let url = self.repo_url(&format!("actions/workflows/{workflow}/dispatches"));
        info!(target: "host", "Dispatching workflow {} on {}", workflow, request.git_ref);
        self.send(self.api_request(Method::POST, &url).json(request), &url).await?;
        Ok(())
    }

    /// Stream `url` into `writer`, calling `on_progress` with the running byte count.
    pub async fn download<W>(
        &self,
        url: &str,
        writer: &mut W,
        on_progress: &mut (dyn FnMut(u64, Option<u64>) + Send),
    ) -> Result<DownloadSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let builder = self.authorized(self.http.get(url).header(ACCEPT, BINARY_ACCEPT));
        let mut response = self.send(builder, url).await?;
        let expected_len = response.content_length();

        let mut hasher = Sha256::new();
        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
            on_progress(bytes, expected_len);
        }
        writer.flush().await?;

        Ok(DownloadSummary {
            bytes,
            expected_len,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    /// Fetch a small text asset (checksum lists).
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let builder = self.authorized(self.http.get(url).header(ACCEPT, BINARY_ACCEPT));
        let response = self.send(builder, url).await?;
        Ok(response.text().await?)
    }
}
