//! Publishing release files to the release host.
//!
//! The release record is created (or reused, when the tag already exists)
//! before any upload. Every file in the version's release folder is then
//! uploaded one at a time, checking for cancellation before each. When disk
//! image creation is enabled and a macOS archive was published, a remote
//! workflow is dispatched to build the disk image instead of doing it here.

use super::run::PipelineRun;
use crate::config::{PublishConfig, ReleaseConfig};
use crate::core::{DeskshipError, Result};
use crate::host::{
    CreateReleaseRequest, DispatchInputs, DispatchRequest, Release, ReleaseHostClient,
    SigningParams,
};
use crate::platform::PlatformTarget;
use crate::utils::{ProgressBar, list_files};
use std::path::Path;

/// What the publish stage did.
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// The release the files were attached to.
    pub release: Release,
    /// Whether the release was created by this run (rather than reused).
    pub created: bool,
    /// Names of files uploaded by this run.
    pub uploaded: Vec<String>,
    /// Names of files already attached to a reused release.
    pub skipped: Vec<String>,
    /// Whether the disk image workflow was dispatched.
    pub disk_image_triggered: bool,
}

/// Publishes a release folder through a [`ReleaseHostClient`].
#[derive(Debug, Clone)]
pub struct Publisher {
    client: ReleaseHostClient,
    config: PublishConfig,
}

impl Publisher {
    /// Publisher for the `[publish]` section.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::InvalidRepository`] if the repository URL has
    /// no owner/repository pair.
    pub fn new(config: &PublishConfig) -> Result<Self> {
        let client = ReleaseHostClient::for_repository(
            &config.api_base,
            &config.repository,
            Some(config.token.as_str()),
        )?;
        Ok(Self::with_client(client, config))
    }

    /// Publisher using an existing client.
    #[must_use]
    pub fn with_client(client: ReleaseHostClient, config: &PublishConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Create the release for `version` and upload everything in `release_dir`.
    ///
    /// Assets already attached to a reused release are skipped, so a re-run
    /// after a partial publish only uploads what is missing.
    pub async fn publish(
        &self,
        run: &PipelineRun,
        release_config: &ReleaseConfig,
        version: &str,
        release_dir: &Path,
    ) -> Result<PublishReport> {
        let files = list_files(release_dir)?;
        if files.is_empty() {
            return Err(DeskshipError::Integrity {
                reason: format!("no release files in {}", release_dir.display()),
            });
        }

        run.checkpoint()?;
        run.set_status(format!("Creating release {}", crate::version::tag_for(version)));
        let request = CreateReleaseRequest {
            tag_name: crate::version::tag_for(version),
            name: release_config.release_title(version),
            body: self.config.notes.clone(),
            prerelease: self.config.prerelease,
        };
        let (mut release, created) = self.client.ensure_release(&request).await?;
        if created {
            tracing::info!("Created release {} ({})", release.tag_name, release.html_url);
        }

        let progress = ProgressBar::new(files.len() as u64);
        let mut uploaded = Vec::new();
        let mut skipped = Vec::new();

        for (index, path) in files.iter().enumerate() {
            run.checkpoint()?;

            let name = file_name(path);
            if release.asset(&name).is_some() {
                tracing::info!("Skipping {}: already attached to {}", name, release.tag_name);
                skipped.push(name);
                progress.inc(1);
                continue;
            }

            let status = format!("Uploading {} ({}/{})", name, index + 1, files.len());
            progress.set_message(status.clone());
            run.set_status(status);

            let asset = self.client.upload_asset(&release, path).await?;
            tracing::debug!("Uploaded {} ({} bytes)", asset.name, asset.size);
            release.assets.push(asset);
            uploaded.push(name);
            progress.inc(1);
        }
        progress.finish_and_clear();

        let mut disk_image_triggered = false;
        if self.config.disk_image {
            let mac_archive = PlatformTarget::MacOS.archive_name(&release_config.product.name);
            if release.asset(&mac_archive).is_some() {
                run.checkpoint()?;
                run.set_status("Triggering disk image creation");
                self.dispatch_disk_image(
                    &release,
                    &release_config.product.name,
                    version,
                    signing_params(release_config).as_ref(),
                )
                .await?;
                disk_image_triggered = true;
            } else {
                tracing::info!("No {} in this release, skipping disk image creation", mac_archive);
            }
        }

        Ok(PublishReport {
            release,
            created,
            uploaded,
            skipped,
            disk_image_triggered,
        })
    }

    /// Dispatch the disk image workflow for an already published release.
    ///
    /// Uses the release tagged for `version`, or the newest published release
    /// when no version is given.
    ///
    /// # Errors
    ///
    /// - [`DeskshipError::Configuration`] when no matching release exists
    /// - [`DeskshipError::NoCompatibleAsset`] when the release has no macOS archive
    pub async fn trigger_disk_image(
        &self,
        product: &str,
        version: Option<&str>,
        signing: Option<&SigningParams>,
    ) -> Result<Release> {
        let release = match version {
            Some(version) => self.client.release_by_tag(&crate::version::tag_for(version)).await?,
            None => self.client.list_releases().await?.into_iter().find(|r| !r.draft),
        };
        let release = release.ok_or_else(|| DeskshipError::Configuration {
            reason: match version {
                Some(version) => format!("no release tagged {}", crate::version::tag_for(version)),
                None => format!("no published release in {}", self.client.repo()),
            },
        })?;

        let release_version = release.tag_name.trim_start_matches(['v', 'V']).to_string();
        self.dispatch_disk_image(&release, product, &release_version, signing).await?;
        Ok(release)
    }

    async fn dispatch_disk_image(
        &self,
        release: &Release,
        product: &str,
        version: &str,
        signing: Option<&SigningParams>,
    ) -> Result<()> {
        let archive_name = PlatformTarget::MacOS.archive_name(product);
        let archive = release.asset(&archive_name).ok_or_else(|| DeskshipError::NoCompatibleAsset {
            version: version.to_string(),
            expected: vec![archive_name.clone()],
        })?;

        let mut inputs =
            DispatchInputs::new(&archive.browser_download_url, product, version, release.id);
        if let Some(params) = signing {
            inputs = inputs.with_signing_params(params)?;
        }

        let request = DispatchRequest {
            git_ref: self.config.workflow_ref.clone(),
            inputs,
        };
        self.client.dispatch_workflow(&self.config.workflow, &request).await?;
        tracing::info!(
            "Disk image workflow {} dispatched for {}",
            self.config.workflow,
            release.tag_name
        );
        Ok(())
    }
}

/// Signing parameters forwarded to the disk image workflow, when signing is enabled.
#[must_use]
pub fn signing_params(config: &ReleaseConfig) -> Option<SigningParams> {
    if !config.signing.enabled {
        return None;
    }
    let notarization = &config.signing.notarization;
    Some(SigningParams {
        team_id: notarization.team_id.clone(),
        apple_id: notarization.apple_id.clone(),
        bundle_id: config.product.bundle_id.clone(),
        notarize: notarization.enabled,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_params_only_when_signing() {
        let mut config = ReleaseConfig::new("App", "1.0.0");
        assert!(signing_params(&config).is_none());

        config.signing.enabled = true;
        config.signing.notarization.enabled = true;
        config.signing.notarization.team_id = "T1".into();
        config.product.bundle_id = Some("com.acme.app".into());

        let params = signing_params(&config).unwrap();
        assert_eq!(params.team_id, "T1");
        assert_eq!(params.bundle_id.as_deref(), Some("com.acme.app"));
        assert!(params.notarize);
    }
}
