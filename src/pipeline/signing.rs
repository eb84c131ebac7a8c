//! macOS code signing and notarization.
//!
//! Signing runs in three steps:
//!
//! 1. **Identity extraction**: the certificate is imported into a disposable,
//!    uniquely named keychain, which is queried for a code signing identity
//!    and then deleted. The keychain never outlives extraction, including on
//!    failure.
//! 2. **Signing**: `codesign` runs recursively over the bundle with the
//!    hardened runtime and the entitlements (custom or generated). If it
//!    times out, the bundle is signed ad-hoc instead of hanging the run.
//! 3. **Verification**: `codesign --verify --deep --strict`.
//!
//! Notarization (archive, submit and wait, staple) is best-effort: its
//! failure is reported to the caller but does not fail signing.

use crate::config::SigningConfig;
use crate::constants::{
    CODESIGN_TIMEOUT, KEYCHAIN_TIMEOUT, NOTARIZE_TIMEOUT, STAPLE_TIMEOUT, VERIFY_TIMEOUT,
};
use crate::core::{DeskshipError, Result};
use crate::process::{RetryPolicy, ToolCommand};
use crate::utils::TempDir;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identity name `codesign` accepts for an ad-hoc signature.
pub const AD_HOC_IDENTITY: &str = "-";

/// Entitlements applied when no custom file is configured.
const DEFAULT_ENTITLEMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>com.apple.security.cs.allow-jit</key>
    <true/>
    <key>com.apple.security.cs.allow-unsigned-executable-memory</key>
    <true/>
    <key>com.apple.security.cs.disable-library-validation</key>
    <true/>
</dict>
</plist>
"#;

/// A code signing identity found in a keychain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    /// SHA-1 fingerprint of the certificate.
    pub hash: String,
    /// Common name, e.g. `Developer ID Application: Acme Inc (TEAMID)`.
    pub name: String,
}

/// Programs the signer shells out to.
///
/// Overridable so the whole flow can run against stand-ins.
#[derive(Debug, Clone)]
pub struct SigningTools {
    /// Keychain tool.
    pub security: OsString,
    /// Signing tool.
    pub codesign: OsString,
    /// Archiver used to submit the bundle.
    pub ditto: OsString,
    /// Developer tool driver (`notarytool`, `stapler`).
    pub xcrun: OsString,
}

impl Default for SigningTools {
    fn default() -> Self {
        Self {
            security: "security".into(),
            codesign: "codesign".into(),
            ditto: "ditto".into(),
            xcrun: "xcrun".into(),
        }
    }
}

/// What signing did to the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignReport {
    /// Identity the bundle was signed with ([`AD_HOC_IDENTITY`] for ad-hoc).
    pub identity: String,
    /// Whether signing fell back to an ad-hoc signature.
    pub ad_hoc: bool,
    /// `None` when notarization is disabled, otherwise whether it succeeded
    /// (with the failure message).
    pub notarization: Option<std::result::Result<(), String>>,
}

/// Signs and optionally notarizes a macOS bundle.
#[derive(Debug, Clone)]
pub struct MacSigner {
    config: SigningConfig,
    tools: SigningTools,
    retry: RetryPolicy,
    codesign_timeout: Duration,
}

impl MacSigner {
    /// Signer for the `[signing]` section.
    #[must_use]
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            config: config.clone(),
            tools: SigningTools::default(),
            retry: RetryPolicy::default(),
            codesign_timeout: CODESIGN_TIMEOUT,
        }
    }

    /// Use different programs.
    #[must_use]
    pub fn with_tools(mut self, tools: SigningTools) -> Self {
        self.tools = tools;
        self
    }

    /// Use a different retry policy for `codesign`.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use a different `codesign` timeout.
    #[must_use]
    pub const fn with_codesign_timeout(mut self, timeout: Duration) -> Self {
        self.codesign_timeout = timeout;
        self
    }

    /// Sign, verify and (when enabled) notarize `bundle`.
    ///
    /// # Errors
    ///
    /// Identity extraction, signing and verification failures are returned.
    /// Notarization failures are reported in [`SignReport::notarization`].
    pub async fn sign(&self, bundle: &Path) -> Result<SignReport> {
        if !bundle.exists() {
            return Err(DeskshipError::Integrity {
                reason: format!("bundle {} does not exist", bundle.display()),
            });
        }

        let scratch = TempDir::new("sign")?;

        let identity = match self.extract_identity(scratch.path()).await {
            Ok(identity) => {
                tracing::info!("Signing with identity {}", identity.name);
                identity.hash
            }
            Err(DeskshipError::ToolTimeout { tool, seconds }) => {
                tracing::warn!(
                    "{} timed out after {}s during identity extraction, signing ad-hoc",
                    tool,
                    seconds
                );
                AD_HOC_IDENTITY.to_string()
            }
            Err(e) => return Err(e),
        };

        let entitlements = self.entitlements_path(scratch.path())?;

        let identity = match self.codesign(bundle, &entitlements, &identity).await {
            Ok(()) => identity,
            Err(DeskshipError::ToolTimeout { seconds, .. }) if identity != AD_HOC_IDENTITY => {
                tracing::warn!(
                    "codesign timed out after {}s, falling back to ad-hoc signing",
                    seconds
                );
                self.codesign(bundle, &entitlements, AD_HOC_IDENTITY).await?;
                AD_HOC_IDENTITY.to_string()
            }
            Err(e) => return Err(e),
        };

        self.verify(bundle).await?;

        let notarization = if self.config.notarization.enabled {
            match self.notarize(bundle, scratch.path()).await {
                Ok(()) => {
                    tracing::info!("Notarized and stapled {}", bundle.display());
                    Some(Ok(()))
                }
                Err(e) => {
                    tracing::warn!("Notarization failed: {}", e);
                    if let Some(output) = e.captured_output() {
                        tracing::warn!("notarytool output:\n{}", output.trim());
                    }
                    Some(Err(e.to_string()))
                }
            }
        } else {
            None
        };

        Ok(SignReport {
            ad_hoc: identity == AD_HOC_IDENTITY,
            identity,
            notarization,
        })
    }

    /// Import the certificate into a throwaway keychain and read its identity.
    async fn extract_identity(&self, scratch: &Path) -> Result<SigningIdentity> {
        let certificate = self.config.certificate.as_deref().ok_or_else(|| {
            DeskshipError::Configuration {
                reason: "signing enabled but no certificate configured".to_string(),
            }
        })?;

        let keychain = scratch.join(format!("deskship-{}.keychain-db", uuid::Uuid::new_v4()));
        let keychain_password = uuid::Uuid::new_v4().simple().to_string();

        let result = self.query_keychain(&keychain, &keychain_password, certificate).await;

        let deleted = self
            .security()
            .arg("delete-keychain")
            .arg(keychain.as_os_str())
            .output()
            .await;
        match deleted {
            Ok(output) if output.success() => {
                tracing::debug!(target: "tool", "Deleted keychain {}", keychain.display());
            }
            Ok(output) => {
                tracing::warn!(
                    "Failed to delete keychain {}: {}",
                    keychain.display(),
                    output.stderr.trim()
                );
            }
            Err(e) => tracing::warn!("Failed to delete keychain {}: {}", keychain.display(), e),
        }

        result
    }

    async fn query_keychain(
        &self,
        keychain: &Path,
        keychain_password: &str,
        certificate: &Path,
    ) -> Result<SigningIdentity> {
        self.security()
            .arg("create-keychain")
            .arg("-p")
            .secret_arg(keychain_password)
            .arg(keychain.as_os_str())
            .execute()
            .await?;

        self.security()
            .arg("unlock-keychain")
            .arg("-p")
            .secret_arg(keychain_password)
            .arg(keychain.as_os_str())
            .execute()
            .await?;

        self.security()
            .arg("import")
            .arg(certificate.as_os_str())
            .arg("-k")
            .arg(keychain.as_os_str())
            .arg("-P")
            .secret_arg(self.config.certificate_password.as_str())
            .args(["-T", "/usr/bin/codesign"])
            .execute()
            .await?;

        let output = self
            .security()
            .args(["find-identity", "-v", "-p", "codesigning"])
            .arg(keychain.as_os_str())
            .execute()
            .await?;

        parse_identity(&output.stdout).ok_or_else(|| DeskshipError::Configuration {
            reason: format!(
                "certificate {} contains no valid code signing identity",
                certificate.display()
            ),
        })
    }

    fn security(&self) -> ToolCommand {
        ToolCommand::new(self.tools.security.clone())
            .with_timeout(Some(KEYCHAIN_TIMEOUT))
            .with_context("keychain")
    }

    /// Custom entitlements, or the default written into `scratch`.
    fn entitlements_path(&self, scratch: &Path) -> Result<PathBuf> {
        if let Some(custom) = &self.config.entitlements {
            return Ok(custom.clone());
        }
        let path = scratch.join("entitlements.plist");
        std::fs::write(&path, DEFAULT_ENTITLEMENTS)?;
        Ok(path)
    }

    async fn codesign(&self, bundle: &Path, entitlements: &Path, identity: &str) -> Result<()> {
        let mut command = ToolCommand::new(self.tools.codesign.clone())
            .args(["--deep", "--force", "--options", "runtime"]);
        if identity != AD_HOC_IDENTITY {
            command = command.arg("--timestamp");
        }
        let command = command
            .arg("--entitlements")
            .arg(entitlements.as_os_str())
            .arg("--sign")
            .arg(identity)
            .arg(bundle.as_os_str())
            .with_timeout(Some(self.codesign_timeout))
            .with_context("codesign");

        self.retry
            .run("codesign", || {
                let command = command.clone();
                async move { command.execute().await.map(|_| ()) }
            })
            .await
    }

    async fn verify(&self, bundle: &Path) -> Result<()> {
        ToolCommand::new(self.tools.codesign.clone())
            .args(["--verify", "--deep", "--strict", "--verbose=2"])
            .arg(bundle.as_os_str())
            .with_timeout(Some(VERIFY_TIMEOUT))
            .with_context("verify signature")
            .execute()
            .await?;
        tracing::debug!("Signature verified for {}", bundle.display());
        Ok(())
    }

    async fn notarize(&self, bundle: &Path, scratch: &Path) -> Result<()> {
        let notarization = &self.config.notarization;
        let submission = scratch.join("notarize.zip");

        ToolCommand::new(self.tools.ditto.clone())
            .args(["-c", "-k", "--keepParent"])
            .arg(bundle.as_os_str())
            .arg(submission.as_os_str())
            .with_timeout(Some(CODESIGN_TIMEOUT))
            .with_context("notarize")
            .execute()
            .await?;

        ToolCommand::new(self.tools.xcrun.clone())
            .args(["notarytool", "submit"])
            .arg(submission.as_os_str())
            .arg("--apple-id")
            .arg(notarization.apple_id.as_str())
            .arg("--team-id")
            .arg(notarization.team_id.as_str())
            .arg("--password")
            .secret_arg(notarization.app_password.as_str())
            .arg("--wait")
            .with_timeout(Some(NOTARIZE_TIMEOUT))
            .with_context("notarize")
            .execute()
            .await?;

        ToolCommand::new(self.tools.xcrun.clone())
            .args(["stapler", "staple"])
            .arg(bundle.as_os_str())
            .with_timeout(Some(STAPLE_TIMEOUT))
            .with_context("staple")
            .execute()
            .await?;

        Ok(())
    }
}

/// Pick a signing identity from `security find-identity` output.
///
/// `Developer ID Application` identities win over any other valid identity.
#[must_use]
pub fn parse_identity(output: &str) -> Option<SigningIdentity> {
    let pattern = Regex::new(r#"(?m)^\s*\d+\)\s+([0-9A-Fa-f]{40})\s+"([^"]+)""#).ok()?;
    let identities: Vec<SigningIdentity> = pattern
        .captures_iter(output)
        .map(|caps| SigningIdentity {
            hash: caps[1].to_ascii_uppercase(),
            name: caps[2].to_string(),
        })
        .collect();

    identities
        .iter()
        .find(|identity| identity.name.starts_with("Developer ID Application"))
        .or_else(|| identities.first())
        .cloned()
}
