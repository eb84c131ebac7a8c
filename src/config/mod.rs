//! Configuration for release pipeline runs and the updater.
//!
//! Configuration lives in `deskship.toml` next to the project. The file is
//! deserialized into [`ReleaseConfig`], which captures everything a pipeline
//! run needs: the product identity, which platforms to build, how to pick the
//! version, and a parameter bundle for every optional stage.
//!
//! # Example
//!
//! ```toml
//! platforms = ["windows", "macos", "linux"]
//! output_root = "dist"
//!
//! [product]
//! name = "App"
//! version = "1.0.5"
//!
//! [version]
//! policy = "auto-increment"
//!
//! [build]
//! command = ["cargo", "build", "--release", "--target", "{target}"]
//! artifact = "target/{target}/release/{executable}"
//!
//! [publish]
//! enabled = true
//! repository = "https://github.com/acme/app"
//! token = "env:GITHUB_TOKEN"
//! ```
//!
//! # Secrets and Paths
//!
//! String secrets (`certificate_password`, `app_password`, `token`) may be
//! written as `env:NAME` to read them from the environment at load time.
//! Paths go through `shellexpand`, and relative paths are resolved against the
//! directory containing the configuration file.

mod persist;
mod updater;
pub mod validation;

pub use persist::persist_product_version;
pub use updater::UpdaterConfig;

use crate::constants::{DEFAULT_API_BASE, DEFAULT_DISK_IMAGE_WORKFLOW, DEFAULT_WORKFLOW_REF};
use crate::platform::PlatformTarget;
use crate::version::VersionPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "deskship.toml";

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "DESKSHIP_CONFIG";

/// User-declared intent for one release.
///
/// A pipeline run takes a snapshot of this value when it starts; later edits
/// to the caller's copy have no effect on the running pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Platforms to build, processed in [`PlatformTarget::ALL`] order.
    #[serde(default)]
    pub platforms: BTreeSet<PlatformTarget>,

    /// Directory under which `Builds/` and `Releases/` are created.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Product identity.
    pub product: ProductConfig,

    /// Version assignment.
    #[serde(default)]
    pub version: VersionConfig,

    /// External build step.
    #[serde(default)]
    pub build: BuildConfig,

    /// macOS code signing and notarization.
    #[serde(default)]
    pub signing: SigningConfig,

    /// Windows installer generation.
    #[serde(default)]
    pub installer: InstallerConfig,

    /// Publishing to the release host.
    #[serde(default)]
    pub publish: PublishConfig,

    /// Client-side updater settings, when the same file drives both.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updater: Option<UpdaterConfig>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

/// Product identity shared by every stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductConfig {
    /// Product name used in directory, executable and asset names.
    pub name: String,
    /// Current version; the starting point for auto-increment.
    #[serde(default)]
    pub version: String,
    /// Reverse-DNS bundle identifier (macOS).
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// Publisher shown by installers.
    #[serde(default)]
    pub publisher: Option<String>,
}

/// Version assignment settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Auto-increment or explicit.
    #[serde(default)]
    pub policy: VersionPolicy,
    /// Version used verbatim under the explicit policy.
    #[serde(default)]
    pub explicit: String,
}

/// External build step configuration.
///
/// The command and artifact path may contain placeholders: `{target}`
/// (compiler target), `{platform}` (platform label), `{executable}`,
/// `{version}`, `{product}` and `{out_dir}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Program and arguments.
    #[serde(default)]
    pub command: Vec<String>,
    /// Path of the produced executable or bundle, copied into the build directory.
    ///
    /// When unset the command is expected to write into `{out_dir}` itself.
    #[serde(default)]
    pub artifact: Option<String>,
    /// Working directory for the command (defaults to the config directory).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// macOS code signing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Whether the sign stage runs.
    #[serde(default)]
    pub enabled: bool,
    /// PKCS#12 certificate file.
    #[serde(default)]
    pub certificate: Option<PathBuf>,
    /// Certificate password (supports `env:NAME`).
    #[serde(default)]
    pub certificate_password: String,
    /// Custom entitlements plist; a minimal default is generated otherwise.
    #[serde(default)]
    pub entitlements: Option<PathBuf>,
    /// Notarization after signing.
    #[serde(default)]
    pub notarization: NotarizationConfig,
}

/// Notarization credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotarizationConfig {
    /// Whether to notarize and staple after signing.
    #[serde(default)]
    pub enabled: bool,
    /// Developer team id.
    #[serde(default)]
    pub team_id: String,
    /// Apple ID used for submission.
    #[serde(default)]
    pub apple_id: String,
    /// App-specific password (supports `env:NAME`).
    #[serde(default)]
    pub app_password: String,
}

/// Windows installer generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Whether the installer stage runs.
    #[serde(default)]
    pub enabled: bool,
    /// Path to the installer compiler (e.g. `ISCC.exe`).
    #[serde(default)]
    pub compiler: Option<PathBuf>,
    /// Stable application id embedded in the installer.
    #[serde(default)]
    pub app_id: String,
    /// Publisher URL shown by the installer.
    #[serde(default)]
    pub url: Option<String>,
}

/// Publishing to the release host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Whether the publish stage runs.
    #[serde(default)]
    pub enabled: bool,
    /// Repository URL (`https://github.com/<owner>/<repo>`).
    #[serde(default)]
    pub repository: String,
    /// API token (supports `env:NAME`).
    #[serde(default)]
    pub token: String,
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Mark the release as a prerelease.
    #[serde(default)]
    pub prerelease: bool,
    /// Release title; defaults to `{product} {version}`.
    #[serde(default)]
    pub title: Option<String>,
    /// Release description.
    #[serde(default)]
    pub notes: String,
    /// Trigger remote disk image creation after publishing.
    #[serde(default)]
    pub disk_image: bool,
    /// Workflow file dispatched for disk image creation.
    #[serde(default = "default_workflow")]
    pub workflow: String,
    /// Git ref the workflow runs against.
    #[serde(default = "default_workflow_ref")]
    pub workflow_ref: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repository: String::new(),
            token: String::new(),
            api_base: default_api_base(),
            prerelease: false,
            title: None,
            notes: String::new(),
            disk_image: false,
            workflow: default_workflow(),
            workflow_ref: default_workflow_ref(),
        }
    }
}

pub(crate) fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_workflow() -> String {
    DEFAULT_DISK_IMAGE_WORKFLOW.to_string()
}

fn default_workflow_ref() -> String {
    DEFAULT_WORKFLOW_REF.to_string()
}

impl ReleaseConfig {
    /// Minimal configuration for `product` with no platforms and every stage disabled.
    #[must_use]
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            platforms: BTreeSet::new(),
            output_root: default_output_root(),
            product: ProductConfig {
                name: product.into(),
                version: version.into(),
                ..ProductConfig::default()
            },
            version: VersionConfig::default(),
            build: BuildConfig::default(),
            signing: SigningConfig::default(),
            installer: InstallerConfig::default(),
            publish: PublishConfig::default(),
            updater: None,
        }
    }

    /// Path of the configuration file: `$DESKSHIP_CONFIG` or `./deskship.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Load from an explicit path, or from [`default_path`](Self::default_path).
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(Self::default_path);
        Self::load_from(&path).await
    }

    /// Load and resolve a configuration file.
    ///
    /// Secrets written as `env:NAME` are read from the environment and paths
    /// are expanded and made absolute relative to the file's directory.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve(&base_dir);

        Ok(config)
    }

    /// Resolve secrets and paths in place.
    pub fn resolve(&mut self, base_dir: &Path) {
        self.output_root = resolve_path(base_dir, &self.output_root);
        self.build.working_dir = Some(
            self.build
                .working_dir
                .as_deref()
                .map_or_else(|| base_dir.to_path_buf(), |dir| resolve_path(base_dir, dir)),
        );

        self.signing.certificate =
            self.signing.certificate.as_deref().map(|p| resolve_path(base_dir, p));
        self.signing.entitlements =
            self.signing.entitlements.as_deref().map(|p| resolve_path(base_dir, p));
        self.signing.certificate_password = resolve_secret(&self.signing.certificate_password);
        self.signing.notarization.app_password =
            resolve_secret(&self.signing.notarization.app_password);

        self.installer.compiler =
            self.installer.compiler.as_deref().map(|p| resolve_path(base_dir, p));

        self.publish.token = resolve_secret(&self.publish.token);

        if let Some(updater) = self.updater.as_mut() {
            updater.resolve(base_dir);
        }
    }

    /// Release title for `version`.
    #[must_use]
    pub fn release_title(&self, version: &str) -> String {
        self.publish
            .title
            .clone()
            .unwrap_or_else(|| format!("{} {version}", self.product.name))
    }

    /// Selected platforms in processing order.
    #[must_use]
    pub fn selected_platforms(&self) -> Vec<PlatformTarget> {
        self.platforms.iter().copied().collect()
    }
}

/// Expand `~`/`$VAR` and make `path` absolute relative to `base_dir`.
pub(crate) fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map(|s| PathBuf::from(s.as_ref()))
        .unwrap_or_else(|_| path.to_path_buf());

    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

/// Resolve an `env:NAME` secret; other values are returned unchanged.
///
/// A missing variable resolves to an empty string so validation reports it
/// alongside every other missing setting.
pub(crate) fn resolve_secret(value: &str) -> String {
    match value.strip_prefix("env:") {
        Some(name) => std::env::var(name.trim()).unwrap_or_else(|_| {
            tracing::warn!("Environment variable {} is not set", name.trim());
            String::new()
        }),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
platforms = ["windows", "macos"]
output_root = "dist"

[product]
name = "App"
version = "1.0.5"

[version]
policy = "explicit"
explicit = "2.0.0"

[build]
command = ["make", "{target}"]

[signing]
enabled = true
certificate = "certs/dev.p12"
certificate_password = "env:DESKSHIP_TEST_CERT_PASSWORD"

[publish]
enabled = true
repository = "https://github.com/acme/app"
token = "literal-token"
"#;

    #[tokio::test]
    #[serial]
    async fn test_load_resolves_paths_and_secrets() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        unsafe {
            std::env::set_var("DESKSHIP_TEST_CERT_PASSWORD", "s3cret");
        }
        let config = ReleaseConfig::load_from(&path).await.unwrap();
        unsafe {
            std::env::remove_var("DESKSHIP_TEST_CERT_PASSWORD");
        }

        assert_eq!(config.product.name, "App");
        assert_eq!(config.version.policy, VersionPolicy::Explicit);
        assert_eq!(
            config.selected_platforms(),
            vec![PlatformTarget::Windows, PlatformTarget::MacOS]
        );
        assert_eq!(config.output_root, temp.path().join("dist"));
        assert_eq!(config.signing.certificate, Some(temp.path().join("certs/dev.p12")));
        assert_eq!(config.signing.certificate_password, "s3cret");
        assert_eq!(config.publish.token, "literal-token");
        assert_eq!(config.publish.api_base, DEFAULT_API_BASE);
        assert_eq!(config.publish.workflow, DEFAULT_DISK_IMAGE_WORKFLOW);
        assert_eq!(config.build.working_dir.as_deref(), Some(temp.path()));
    }

    #[test]
    #[serial]
    fn test_missing_env_secret_resolves_empty() {
        unsafe {
            std::env::remove_var("DESKSHIP_TEST_UNSET_SECRET");
        }
        assert_eq!(resolve_secret("env:DESKSHIP_TEST_UNSET_SECRET"), "");
        assert_eq!(resolve_secret("plain"), "plain");
    }

    #[test]
    fn test_duplicate_platforms_collapse() {
        let config: ReleaseConfig = toml::from_str(
            r#"
platforms = ["linux", "windows", "linux"]
[product]
name = "App"
"#,
        )
        .unwrap();
        assert_eq!(
            config.selected_platforms(),
            vec![PlatformTarget::Windows, PlatformTarget::Linux]
        );
    }

    #[test]
    fn test_release_title_default() {
        let mut config = ReleaseConfig::new("App", "1.0.0");
        assert_eq!(config.release_title("1.0.1"), "App 1.0.1");
        config.publish.title = Some("Spring release".into());
        assert_eq!(config.release_title("1.0.1"), "Spring release");
    }
}
