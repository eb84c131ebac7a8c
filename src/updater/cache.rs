//! Rate-limited update checks.
//!
//! Applications usually check for updates on startup. [`UpdateChecker`]
//! remembers the last answer in a small JSON file and only asks the release
//! host again once `check_interval_secs` has passed.

use super::resolver::{CheckOutcome, UpdateResolver};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the cache inside the cache directory.
pub const CACHE_FILE: &str = "update_check.json";

/// Last check result as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCheckCache {
    /// Newest eligible version seen (the running version when none was found).
    pub latest_version: String,
    /// Version that was running at check time.
    pub current_version: String,
    /// When the host was asked.
    pub checked_at: DateTime<Utc>,
    /// Whether a compatible newer release existed.
    pub update_available: bool,
}

impl VersionCheckCache {
    /// Entry for a check just made.
    pub fn new(current_version: &str, outcome: &CheckOutcome) -> Self {
        let (latest_version, update_available) = match outcome {
            CheckOutcome::UpdateAvailable(candidate) => (candidate.version.clone(), true),
            CheckOutcome::UpToDate { latest } => {
                (latest.clone().unwrap_or_else(|| current_version.to_string()), false)
            }
            CheckOutcome::NoCompatibleAsset { version, .. } => (version.clone(), false),
        };
        Self {
            latest_version,
            current_version: current_version.to_string(),
            checked_at: Utc::now(),
            update_available,
        }
    }

    /// Whether this entry is younger than `interval_seconds`.
    pub fn is_valid(&self, interval_seconds: u64) -> bool {
        let age = Utc::now() - self.checked_at;
        age.num_seconds() < i64::try_from(interval_seconds).unwrap_or(i64::MAX)
    }
}

/// Update checks that consult the cache first.
pub struct UpdateChecker {
    resolver: UpdateResolver,
    cache_path: PathBuf,
    interval_secs: u64,
}

impl UpdateChecker {
    /// Checker using the cache directory and interval from `config`.
    pub fn new(resolver: UpdateResolver, config: &crate::config::UpdaterConfig) -> Self {
        Self {
            resolver,
            cache_path: config.cache_dir().join(CACHE_FILE),
            interval_secs: config.check_interval_secs,
        }
    }

    /// Store the cache under `dir` instead.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: &Path) -> Self {
        self.cache_path = dir.join(CACHE_FILE);
        self
    }

    /// Path of the cache file.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Newer version available, answering from the cache while it is fresh.
    ///
    /// A failed check is logged and reported as "nothing new" so startup is
    /// never blocked by the release host; the cache is left alone in that case.
    pub async fn check(&self) -> Result<Option<String>> {
        if self.interval_secs == 0 {
            debug!("Automatic update checks disabled");
            return Ok(None);
        }

        if let Some(cache) = self.load_cache().await? {
            let same_binary = cache.current_version == self.resolver.current_version();
            if same_binary && cache.is_valid(self.interval_secs) {
                debug!("Using cached update check from {}", cache.checked_at);
                return Ok(cache.update_available.then_some(cache.latest_version));
            }
        }

        match self.check_now().await {
            Ok(latest) => Ok(latest),
            Err(e) => {
                debug!("Update check failed: {:#}", e);
                Ok(None)
            }
        }
    }

    /// Ask the release host now and refresh the cache.
    pub async fn check_now(&self) -> Result<Option<String>> {
        let outcome = self.resolver.check().await?;
        let cache = VersionCheckCache::new(self.resolver.current_version(), &outcome);
        self.save_cache(&cache).await?;
        Ok(cache.update_available.then_some(cache.latest_version))
    }

    async fn load_cache(&self) -> Result<Option<VersionCheckCache>> {
        if !self.cache_path.exists() {
            debug!("No update check cache at {}", self.cache_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.cache_path)
            .await
            .context("Failed to read update check cache")?;
        match serde_json::from_str(&content) {
            Ok(cache) => Ok(Some(cache)),
            Err(e) => {
                debug!("Ignoring unreadable update check cache: {}", e);
                Ok(None)
            }
        }
    }

    async fn save_cache(&self, cache: &VersionCheckCache) -> Result<()> {
        let content =
            serde_json::to_string_pretty(cache).context("Failed to serialize update check cache")?;
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).await.context("Failed to create cache directory")?;
        }
        fs::write(&self.cache_path, content).await.context("Failed to write update check cache")?;
        debug!("Saved update check to {}", self.cache_path.display());
        Ok(())
    }

    /// Forget the last check.
    pub async fn clear_cache(&self) -> Result<()> {
        if self.cache_path.exists() {
            fs::remove_file(&self.cache_path).await.context("Failed to remove update check cache")?;
            debug!("Cleared update check cache");
        }
        Ok(())
    }
}
