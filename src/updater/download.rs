//! Fetching and verifying an update asset.

use super::resolver::UpdateCandidate;
use crate::core::{DeskshipError, Result};
use crate::host::{Release, ReleaseHostClient};
use crate::utils::ProgressBar;
use std::path::Path;
use tempfile::NamedTempFile;

/// Release asset listing digests for every other asset.
pub const CHECKSUMS_ASSET: &str = "checksums.txt";

/// A fully written download, removed when dropped.
#[derive(Debug)]
pub struct DownloadedAsset {
    /// The temporary file holding the bytes.
    pub file: NamedTempFile,
    /// Bytes written.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the bytes.
    pub sha256: String,
    /// Whether the digest was checked against a published checksum.
    pub checksum_verified: bool,
}

impl DownloadedAsset {
    /// Path of the downloaded file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Download `candidate` into a temporary file under `dir`.
///
/// The file keeps the asset's extension, since some tools (`hdiutil`)
/// care about it.
///
/// # Errors
///
/// - [`DeskshipError::Network`] when the request fails
/// - [`DeskshipError::Integrity`] when the download is empty, shorter than
///   the announced `Content-Length`, or does not match a published checksum
pub async fn download_asset(
    client: &ReleaseHostClient,
    candidate: &UpdateCandidate,
    dir: &Path,
) -> Result<DownloadedAsset> {
    let suffix = Path::new(&candidate.asset.name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix("deskship_download_")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    let mut writer = tokio::fs::File::from_std(file.reopen()?);

    tracing::info!("Downloading {} ({})", candidate.asset.name, candidate.download_url);
    let total = (candidate.asset.size > 0).then_some(candidate.asset.size);
    let progress = ProgressBar::new_bytes(total);
    progress.set_message(candidate.asset.name.clone());
    let mut on_progress = |bytes: u64, _: Option<u64>| progress.set_position(bytes);
    let summary = client.download(&candidate.download_url, &mut writer, &mut on_progress).await?;
    writer.sync_all().await?;
    drop(writer);
    progress.finish_and_clear();

    if summary.bytes == 0 {
        return Err(DeskshipError::Integrity {
            reason: format!("{} downloaded empty", candidate.asset.name),
        });
    }
    if let Some(expected) = summary.expected_len {
        if expected != summary.bytes {
            return Err(DeskshipError::Integrity {
                reason: format!(
                    "{} is truncated: received {} of {} bytes",
                    candidate.asset.name, summary.bytes, expected
                ),
            });
        }
    }
    tracing::debug!("{} sha256 {}", candidate.asset.name, summary.sha256);

    let published = expected_checksum(client, &candidate.release, &candidate.asset.name).await?;
    let checksum_verified = match published {
        Some(expected) => {
            verify_checksum(&candidate.asset.name, &summary.sha256, &expected)?;
            true
        }
        None => {
            tracing::debug!("No published checksum for {}", candidate.asset.name);
            false
        }
    };

    Ok(DownloadedAsset {
        file,
        bytes: summary.bytes,
        sha256: summary.sha256,
        checksum_verified,
    })
}

/// Published digest for `asset_name`, from `{asset}.sha256` or `checksums.txt`.
async fn expected_checksum(
    client: &ReleaseHostClient,
    release: &Release,
    asset_name: &str,
) -> Result<Option<String>> {
    if let Some(sidecar) = release.asset(&format!("{asset_name}.sha256")) {
        let content = client.fetch_text(&sidecar.browser_download_url).await?;
        return Ok(content.split_whitespace().next().map(str::to_lowercase));
    }
    if let Some(list) = release.asset(CHECKSUMS_ASSET) {
        let content = client.fetch_text(&list.browser_download_url).await?;
        return Ok(parse_checksums(&content, asset_name));
    }
    Ok(None)
}

/// Find `asset_name` in a `sha256sum`-style listing (`<hex>  <name>`).
///
/// A leading `*` (binary mode marker) on the name is ignored.
#[must_use]
pub fn parse_checksums(content: &str, asset_name: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == asset_name).then(|| digest.to_lowercase())
    })
}

fn verify_checksum(asset_name: &str, actual: &str, expected: &str) -> Result<()> {
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!("Checksum verified for {}", asset_name);
        Ok(())
    } else {
        Err(DeskshipError::Integrity {
            reason: format!("{asset_name} checksum mismatch: expected {expected}, got {actual}"),
        })
    }
}
