//! Wire types for the release host API.

use crate::constants::MAX_DISPATCH_INPUTS;
use crate::core::{DeskshipError, Result};
use serde::{Deserialize, Serialize};

/// A release record as returned by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Host-assigned release id.
    pub id: u64,
    /// Tag the release is attached to (`v1.2.3`).
    pub tag_name: String,
    /// Release title.
    #[serde(default)]
    pub name: Option<String>,
    /// Release description.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether the release is marked as not production-ready.
    #[serde(default)]
    pub prerelease: bool,
    /// Whether the release is an unpublished draft.
    #[serde(default)]
    pub draft: bool,
    /// Upload target, possibly with a `{?name,label}` template suffix.
    #[serde(default)]
    pub upload_url: String,
    /// Human-facing release page.
    #[serde(default)]
    pub html_url: String,
    /// Uploaded assets.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Upload URL with any URI template suffix removed.
    #[must_use]
    pub fn upload_base(&self) -> &str {
        self.upload_url
            .split_once('{')
            .map_or(self.upload_url.as_str(), |(base, _)| base)
    }

    /// Asset with exactly `name`, if uploaded.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// One file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// Host-assigned asset id.
    #[serde(default)]
    pub id: u64,
    /// File name.
    pub name: String,
    /// Public download URL.
    pub browser_download_url: String,
    /// API URL of the asset.
    #[serde(default)]
    pub url: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content type recorded at upload.
    #[serde(default)]
    pub content_type: String,
}

/// Body of `POST /repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateReleaseRequest {
    /// Tag to create (`v1.2.3`).
    pub tag_name: String,
    /// Release title.
    pub name: String,
    /// Release description.
    pub body: String,
    /// Prerelease flag.
    pub prerelease: bool,
}

/// Body of a workflow dispatch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Git ref the workflow runs against.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Workflow inputs.
    pub inputs: DispatchInputs,
}

/// Inputs for the remote disk image workflow.
///
/// The dispatch API accepts at most [`MAX_DISPATCH_INPUTS`] top-level inputs,
/// and every input must be a string, so optional signing parameters travel as
/// one JSON-encoded string instead of individual fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchInputs {
    /// Download URL of the macOS archive.
    pub download_url: String,
    /// Product name.
    pub app_name: String,
    /// Released version.
    pub version: String,
    /// Id of the release the disk image is attached to.
    pub release_id: String,
    /// JSON-encoded [`SigningParams`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_params: Option<String>,
}

impl DispatchInputs {
    /// Inputs without signing parameters.
    pub fn new(
        download_url: impl Into<String>,
        app_name: impl Into<String>,
        version: impl Into<String>,
        release_id: u64,
    ) -> Self {
        Self {
            download_url: download_url.into(),
            app_name: app_name.into(),
            version: version.into(),
            release_id: release_id.to_string(),
            signing_params: None,
        }
    }

    /// Attach signing parameters, pre-serialized into a single input.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Configuration`] if the parameters cannot be encoded.
    pub fn with_signing_params(mut self, params: &SigningParams) -> Result<Self> {
        let encoded = serde_json::to_string(params).map_err(|e| DeskshipError::Configuration {
            reason: format!("cannot encode signing parameters: {e}"),
        })?;
        self.signing_params = Some(encoded);
        Ok(self)
    }

    /// Number of top-level inputs that will be sent.
    #[must_use]
    pub const fn input_count(&self) -> usize {
        if self.signing_params.is_some() { 5 } else { 4 }
    }

    /// Ensure the input set fits the dispatch API's limit.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Configuration`] when there are too many inputs.
    pub fn check_bounds(&self) -> Result<()> {
        if self.input_count() > MAX_DISPATCH_INPUTS {
            return Err(DeskshipError::Configuration {
                reason: format!(
                    "workflow dispatch accepts at most {MAX_DISPATCH_INPUTS} inputs, got {}",
                    self.input_count()
                ),
            });
        }
        Ok(())
    }
}

/// Signing settings forwarded to the remote disk image workflow.
///
/// Secrets are not forwarded; the workflow reads them from its own secret store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningParams {
    /// Developer team id.
    pub team_id: String,
    /// Apple ID used for notarization.
    pub apple_id: String,
    /// Bundle identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    /// Whether the workflow should notarize the disk image.
    pub notarize: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upload_base_trims_template() {
        let release: Release = serde_json::from_value(json!({
            "id": 7,
            "tag_name": "v1.0.0",
            "upload_url": "https://uploads.example.com/repos/a/b/releases/7/assets{?name,label}",
            "html_url": "https://example.com/a/b/releases/v1.0.0"
        }))
        .unwrap();
        assert_eq!(
            release.upload_base(),
            "https://uploads.example.com/repos/a/b/releases/7/assets"
        );
        assert!(release.assets.is_empty());
    }

    #[test]
    fn test_dispatch_inputs_stay_within_limit() {
        let params = SigningParams {
            team_id: "TEAM".into(),
            apple_id: "dev@example.com".into(),
            bundle_id: Some("com.example.app".into()),
            notarize: true,
        };
        let inputs = DispatchInputs::new("https://example.com/App-Mac.zip", "App", "1.0.1", 42)
            .with_signing_params(&params)
            .unwrap();

        let value = serde_json::to_value(&inputs).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), inputs.input_count());
        assert!(object.len() <= MAX_DISPATCH_INPUTS);
        assert!(object.values().all(serde_json::Value::is_string));
        inputs.check_bounds().unwrap();

        let nested: SigningParams =
            serde_json::from_str(object["signing_params"].as_str().unwrap()).unwrap();
        assert_eq!(nested, params);
    }

    #[test]
    fn test_dispatch_request_uses_ref_key() {
        let request = DispatchRequest {
            git_ref: "main".into(),
            inputs: DispatchInputs::new("u", "App", "1.0.0", 1),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["ref"], "main");
        assert_eq!(value["inputs"]["release_id"], "1");
        assert!(value["inputs"].get("signing_params").is_none());
    }
}
