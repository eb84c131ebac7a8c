//! Settings for the client-side updater.

use super::{default_api_base, resolve_path, resolve_secret};
use crate::constants::DEFAULT_CHECK_INTERVAL_SECS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Client-side updater settings.
///
/// Embedded in `deskship.toml` as an `[updater]` table, or shipped alongside
/// the installed application as a standalone file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Repository the application is released from.
    pub repository: String,

    /// Product name used to derive expected asset names.
    pub product_name: String,

    /// Optional API token (supports `env:NAME`); unauthenticated when empty.
    #[serde(default)]
    pub token: String,

    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Minimum seconds between automatic checks.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Allow the install action from a development build.
    #[serde(default)]
    pub allow_in_development: bool,

    /// Where the check cache is stored (defaults to the user cache dir).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Installation directory to replace (defaults to the running executable's directory).
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

impl UpdaterConfig {
    /// Updater settings for `repository` and `product_name` with defaults elsewhere.
    pub fn new(repository: impl Into<String>, product_name: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            product_name: product_name.into(),
            token: String::new(),
            api_base: default_api_base(),
            check_interval_secs: default_check_interval(),
            allow_in_development: false,
            cache_dir: None,
            install_dir: None,
        }
    }

    /// Load a standalone updater configuration file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read updater config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse updater config from {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve(base_dir);
        Ok(config)
    }

    pub(super) fn resolve(&mut self, base_dir: &Path) {
        self.token = resolve_secret(&self.token);
        self.cache_dir = self.cache_dir.as_deref().map(|p| resolve_path(base_dir, p));
        self.install_dir = self.install_dir.as_deref().map(|p| resolve_path(base_dir, p));
    }

    /// Token, if one is configured.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        let token = self.token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Directory holding the check cache.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("deskship")
                .join(&self.product_name)
        })
    }
}
