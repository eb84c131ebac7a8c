//! Pre-run validation of a [`ReleaseConfig`].
//!
//! Every check runs before the first stage so an invalid configuration never
//! leaves partial side effects behind. Failures are collected rather than
//! reported one at a time.

use super::ReleaseConfig;
use crate::host::RepoRef;
use crate::platform::PlatformTarget;
use crate::version::VersionPolicy;
use std::path::Path;

/// Tools the sign stage shells out to.
const SIGNING_TOOLS: &[&str] = &["security", "codesign"];

/// Additional tools needed for notarization.
const NOTARIZATION_TOOLS: &[&str] = &["ditto", "xcrun"];

/// Run every rule, using `tool_exists` to probe for external tools.
pub(crate) fn collect_failures(
    config: &ReleaseConfig,
    tool_exists: &dyn Fn(&str) -> bool,
) -> Vec<String> {
    let mut failures = Vec::new();

    if config.platforms.is_empty() {
        failures.push("select at least one platform".to_string());
    }

    if config.product.name.trim().is_empty() {
        failures.push("product name is empty".to_string());
    }

    if config.version.policy == VersionPolicy::Explicit && config.version.explicit.trim().is_empty()
    {
        failures.push("explicit version selected but no version given".to_string());
    }

    let signing = &config.signing;
    if signing.enabled {
        match signing.certificate.as_deref() {
            None => failures.push("signing enabled but no certificate configured".to_string()),
            Some(path) if !path.is_file() => {
                failures.push(format!("signing certificate not found: {}", path.display()));
            }
            Some(_) => {}
        }

        if signing.certificate_password.is_empty() {
            failures.push("signing enabled but certificate password is empty".to_string());
        }

        if let Some(entitlements) = signing.entitlements.as_deref() {
            if !entitlements.is_file() {
                failures.push(format!("entitlements file not found: {}", entitlements.display()));
            }
        }

        if config.platforms.contains(&PlatformTarget::MacOS) {
            missing_tools(SIGNING_TOOLS, tool_exists, &mut failures);
        }
    }

    let notarization = &signing.notarization;
    if notarization.enabled {
        let missing: Vec<&str> = [
            ("team id", notarization.team_id.as_str()),
            ("apple id", notarization.apple_id.as_str()),
            ("app password", notarization.app_password.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            failures.push(format!("notarization enabled but {} empty", missing.join(", ")));
        }

        if signing.enabled && config.platforms.contains(&PlatformTarget::MacOS) {
            missing_tools(NOTARIZATION_TOOLS, tool_exists, &mut failures);
        }
    }

    let installer = &config.installer;
    if installer.enabled {
        match installer.compiler.as_deref() {
            None => {
                failures.push("installer enabled but no installer compiler configured".to_string());
            }
            Some(path) if !is_locatable(path, tool_exists) => {
                failures.push(format!("installer compiler not found: {}", path.display()));
            }
            Some(_) => {}
        }
    }

    let publish = &config.publish;
    if publish.enabled {
        if publish.repository.trim().is_empty() {
            failures.push("publish enabled but repository is empty".to_string());
        } else if RepoRef::parse(&publish.repository).is_err() {
            failures.push(format!(
                "publish repository '{}' is not an owner/repository URL",
                publish.repository
            ));
        }

        if publish.token.trim().is_empty() {
            failures.push("publish enabled but token is empty".to_string());
        }
    }

    failures
}

fn missing_tools(tools: &[&str], tool_exists: &dyn Fn(&str) -> bool, failures: &mut Vec<String>) {
    for tool in tools {
        if !tool_exists(tool) {
            failures.push(format!("required tool '{tool}' not found in PATH"));
        }
    }
}

/// A configured tool is locatable when the path exists or resolves through `PATH`.
fn is_locatable(path: &Path, tool_exists: &dyn Fn(&str) -> bool) -> bool {
    path.is_file() || (path.components().count() == 1 && tool_exists(&path.to_string_lossy()))
}
