//! Finding, fetching and installing the newest compatible release.

use super::download::{DownloadedAsset, download_asset};
use super::environment::ensure_update_allowed;
use super::install::{InstallOutcome, Installer};
use super::state::{StateHandle, UpdateState};
use crate::config::UpdaterConfig;
use crate::core::{DeskshipError, Result};
use crate::host::{Release, ReleaseAsset, ReleaseHostClient};
use crate::platform::{AssetKind, PlatformTarget};
use crate::utils::TempDir;
use crate::version::Version;
use std::time::Duration;

/// A newer release with an asset this platform can install.
#[derive(Debug, Clone)]
pub struct UpdateCandidate {
    /// Version of the release.
    pub version: String,
    /// The release itself.
    pub release: Release,
    /// The matched asset.
    pub asset: ReleaseAsset,
    /// How the asset is installed.
    pub kind: AssetKind,
    /// Where to download it from.
    pub download_url: String,
}

/// Result of one check.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// No eligible release is newer than the running version.
    UpToDate {
        /// Newest eligible version seen, if any.
        latest: Option<String>,
    },
    /// A newer release with a compatible asset exists.
    UpdateAvailable(UpdateCandidate),
    /// The newest release has no asset for this platform.
    NoCompatibleAsset {
        /// Version of that release.
        version: String,
        /// Asset names that would have matched.
        expected: Vec<String>,
    },
}

impl CheckOutcome {
    /// The candidate, when an update is available.
    #[must_use]
    pub const fn candidate(&self) -> Option<&UpdateCandidate> {
        match self {
            Self::UpdateAvailable(candidate) => Some(candidate),
            _ => None,
        }
    }
}

/// Finds, downloads and installs newer releases of the running application.
///
/// # Examples
///
/// ```rust,no_run
/// use deskship::config::UpdaterConfig;
/// use deskship::updater::{CheckOutcome, UpdateResolver};
///
/// # async fn example() -> deskship::core::Result<()> {
/// let config = UpdaterConfig::new("https://github.com/acme/widget", "Widget");
/// let resolver = UpdateResolver::new(config, "1.0.4");
///
/// match resolver.check().await? {
///     CheckOutcome::UpdateAvailable(candidate) => println!("{} is available", candidate.version),
///     CheckOutcome::UpToDate { .. } => println!("up to date"),
///     CheckOutcome::NoCompatibleAsset { version, .. } => println!("{version} has nothing for us"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct UpdateResolver {
    config: UpdaterConfig,
    current_version: String,
    platform: Option<PlatformTarget>,
    installer: Option<Installer>,
    retry_base: Option<Duration>,
    state: StateHandle,
}

impl UpdateResolver {
    /// Resolver for an application currently at `current_version`.
    pub fn new(config: UpdaterConfig, current_version: impl Into<String>) -> Self {
        Self {
            config,
            current_version: current_version.into(),
            platform: PlatformTarget::current(),
            installer: None,
            retry_base: None,
            state: StateHandle::default(),
        }
    }

    /// Match assets for `platform` instead of the running one.
    #[must_use]
    pub const fn with_platform(mut self, platform: PlatformTarget) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Install through `installer` instead of one for the running executable.
    #[must_use]
    pub fn with_installer(mut self, installer: Installer) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Change the first backoff delay of host read retries.
    #[must_use]
    pub const fn with_retry_base(mut self, delay: Duration) -> Self {
        self.retry_base = Some(delay);
        self
    }

    /// The running version.
    #[must_use]
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Current state of the update cycle.
    #[must_use]
    pub fn state(&self) -> UpdateState {
        self.state.get()
    }

    /// Shared handle for observing the state from elsewhere.
    #[must_use]
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    fn client(&self) -> Result<ReleaseHostClient> {
        let client = ReleaseHostClient::for_repository(
            &self.config.api_base,
            &self.config.repository,
            self.config.token(),
        )?;
        Ok(match self.retry_base {
            Some(delay) => client.with_retry_base(delay),
            None => client,
        })
    }

    /// Look for a newer release with an asset for this platform.
    ///
    /// # Errors
    ///
    /// - [`DeskshipError::InvalidRepository`] for a repository URL without owner and name
    /// - [`DeskshipError::Network`] with a kind telling not-found, unauthorized
    ///   and forbidden apart when the repository cannot be reached
    /// - [`DeskshipError::InvalidVersion`] if the running version is malformed
    pub async fn check(&self) -> Result<CheckOutcome> {
        self.state.set(UpdateState::Checking);
        let result = match self.client() {
            Ok(client) => self.check_with(&client).await,
            Err(e) => Err(e),
        };
        self.state.set(match &result {
            Ok(CheckOutcome::UpToDate { .. }) => UpdateState::UpToDate,
            Ok(CheckOutcome::UpdateAvailable(_)) => UpdateState::UpdateAvailable,
            Ok(CheckOutcome::NoCompatibleAsset { .. }) => UpdateState::Idle,
            Err(_) => UpdateState::Error,
        });
        result
    }

    async fn check_with(&self, client: &ReleaseHostClient) -> Result<CheckOutcome> {
        let current = Version::parse(&self.current_version)?;
        let platform = self.platform.ok_or_else(|| DeskshipError::Configuration {
            reason: "this operating system has no published assets".to_string(),
        })?;

        client.check_repository().await?;
        let releases = client.list_releases().await?;
        tracing::debug!("{} releases in {}", releases.len(), client.repo());

        let Some((latest, release)) = newest_eligible(releases) else {
            tracing::info!("No published releases in {}", client.repo());
            return Ok(CheckOutcome::UpToDate {
                latest: None,
            });
        };
        let latest_text = latest.to_string();

        if latest <= current {
            tracing::info!("Up to date ({} is the latest)", self.current_version);
            return Ok(CheckOutcome::UpToDate {
                latest: Some(latest_text),
            });
        }

        let candidates = platform.update_asset_candidates(&self.config.product_name);
        match match_asset(&release, &candidates) {
            Some((asset, kind)) => {
                tracing::info!(
                    "Update available: {} -> {} ({})",
                    self.current_version,
                    latest_text,
                    asset.name
                );
                Ok(CheckOutcome::UpdateAvailable(UpdateCandidate {
                    version: latest_text,
                    download_url: asset.browser_download_url.clone(),
                    asset,
                    kind,
                    release,
                }))
            }
            None => {
                let expected: Vec<String> = candidates.into_iter().map(|(name, _)| name).collect();
                tracing::warn!(
                    "Release {} has no asset for {} (expected one of: {})",
                    latest_text,
                    platform,
                    expected.join(", ")
                );
                Ok(CheckOutcome::NoCompatibleAsset {
                    version: latest_text,
                    expected,
                })
            }
        }
    }

    /// Check again and download the newest compatible asset without installing it.
    ///
    /// Returns `None` when already up to date.
    ///
    /// # Errors
    ///
    /// Everything [`check`](Self::check) reports, [`DeskshipError::NoCompatibleAsset`],
    /// and [`DeskshipError::Integrity`] for an empty, truncated or mismatched download.
    pub async fn download(
        &self,
        dir: &std::path::Path,
    ) -> Result<Option<(UpdateCandidate, DownloadedAsset)>> {
        let Some(candidate) = self.fresh_candidate().await? else {
            return Ok(None);
        };
        self.state.set(UpdateState::Downloading);
        let client = self.client()?;
        match download_asset(&client, &candidate, dir).await {
            Ok(downloaded) => Ok(Some((candidate, downloaded))),
            Err(e) => {
                self.state.set(UpdateState::Error);
                Err(e)
            }
        }
    }

    /// Check, download and install the newest compatible release.
    ///
    /// Returns `None` when already up to date. When the returned outcome
    /// [requires exit](InstallOutcome::requires_exit), the caller must end the
    /// process so the swap can happen.
    ///
    /// Any failure cleans up the download and staging files; the running
    /// installation is never partially replaced.
    ///
    /// # Errors
    ///
    /// - [`DeskshipError::UpdateRefused`] on a development host
    /// - everything [`download`](Self::download) reports
    /// - mount, extraction and script failures from the installer
    pub async fn update(&self) -> Result<Option<InstallOutcome>> {
        ensure_update_allowed(&self.config)?;

        let scratch = TempDir::new("download")?;
        let Some((candidate, downloaded)) = self.download(scratch.path()).await? else {
            return Ok(None);
        };

        let installer = match &self.installer {
            Some(installer) => installer.clone(),
            None => Installer::for_current_process(&self.config)?,
        };

        match installer.install(downloaded.path(), candidate.kind, &self.state).await {
            Ok(outcome) => {
                self.state.set(if outcome.requires_exit() {
                    UpdateState::Restarting
                } else {
                    UpdateState::Idle
                });
                tracing::info!("Update to {} installed", candidate.version);
                Ok(Some(outcome))
            }
            Err(e) => {
                self.state.set(UpdateState::Error);
                tracing::error!("Update to {} failed: {}", candidate.version, e);
                Err(e)
            }
        }
    }

    async fn fresh_candidate(&self) -> Result<Option<UpdateCandidate>> {
        match self.check().await? {
            CheckOutcome::UpdateAvailable(candidate) => Ok(Some(candidate)),
            CheckOutcome::UpToDate { .. } => Ok(None),
            CheckOutcome::NoCompatibleAsset { version, expected } => {
                self.state.set(UpdateState::Error);
                Err(DeskshipError::NoCompatibleAsset {
                    version,
                    expected,
                })
            }
        }
    }
}

/// Newest release that is neither a prerelease nor a draft and has a parseable tag.
fn newest_eligible(releases: Vec<Release>) -> Option<(Version, Release)> {
    releases
        .into_iter()
        .filter(|release| !release.prerelease && !release.draft)
        .filter_map(|release| match Version::parse(&release.tag_name) {
            Ok(version) => Some((version, release)),
            Err(e) => {
                tracing::debug!("Ignoring release {}: {}", release.tag_name, e);
                None
            }
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
}

/// First asset of `release` named like one of `candidates`, in candidate order.
fn match_asset(
    release: &Release,
    candidates: &[(String, AssetKind)],
) -> Option<(ReleaseAsset, AssetKind)> {
    candidates
        .iter()
        .find_map(|(name, kind)| release.asset(name).map(|asset| (asset.clone(), *kind)))
}
