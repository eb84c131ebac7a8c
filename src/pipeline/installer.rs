//! Windows installer generation.
//!
//! An Inno Setup script is rendered with Tera into the release folder next to
//! the installer it produces, then handed to the configured installer
//! compiler (`ISCC.exe`). Both files are published as release assets.

use super::layout::OutputLayout;
use crate::config::{InstallerConfig, ProductConfig};
use crate::constants::DEFAULT_TOOL_TIMEOUT;
use crate::core::{DeskshipError, Result};
use crate::platform::PlatformTarget;
use crate::process::ToolCommand;
use crate::utils::ensure_dir;
use std::path::PathBuf;
use tera::{Context as TeraContext, Tera};

const INSTALLER_TEMPLATE: &str = r#"; {{ product }} {{ version }} installer, generated by deskship
[Setup]
AppId={{ app_id }}
AppName={{ product }}
AppVersion={{ version }}
AppVerName={{ product }} {{ version }}
AppPublisher={{ publisher }}
{% if url %}AppPublisherURL={{ url }}
AppSupportURL={{ url }}
AppUpdatesURL={{ url }}
{% endif %}DefaultDirName={autopf}\{{ product }}
DefaultGroupName={{ product }}
DisableProgramGroupPage=yes
OutputDir={{ output_dir }}
OutputBaseFilename={{ output_base }}
Compression=lzma2
SolidCompression=yes
WizardStyle=modern
ArchitecturesInstallIn64BitMode=x64compatible

[Languages]
Name: "english"; MessagesFile: "compiler:Default.isl"

[Tasks]
Name: "desktopicon"; Description: "{cm:CreateDesktopIcon}"; GroupDescription: "{cm:AdditionalIcons}"; Flags: unchecked

[Files]
Source: "{{ source_dir }}\*"; DestDir: "{app}"; Flags: ignoreversion recursesubdirs createallsubdirs

[Icons]
Name: "{autoprograms}\{{ product }}"; Filename: "{app}\{{ executable }}"
Name: "{autodesktop}\{{ product }}"; Filename: "{app}\{{ executable }}"; Tasks: desktopicon

[Run]
Filename: "{app}\{{ executable }}"; Description: "{cm:LaunchProgram,{{ product }}}"; Flags: nowait postinstall skipifsilent
"#;

/// Renders the installer script and runs the installer compiler.
#[derive(Debug, Clone)]
pub struct InstallerBuilder {
    config: InstallerConfig,
    product: ProductConfig,
}

impl InstallerBuilder {
    /// Builder for the `[installer]` and `[product]` sections.
    #[must_use]
    pub fn new(config: &InstallerConfig, product: &ProductConfig) -> Self {
        Self {
            config: config.clone(),
            product: product.clone(),
        }
    }

    /// Render the Inno Setup script for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Configuration`] if the template fails to render.
    pub fn render_script(&self, layout: &OutputLayout, version: &str) -> Result<String> {
        let product = &self.product.name;
        let mut context = TeraContext::new();
        context.insert("product", product);
        context.insert("version", version);
        context.insert("publisher", self.product.publisher.as_deref().unwrap_or(product));
        context.insert("app_id", &inno_app_id(&self.config.app_id, product));
        context.insert("url", &self.config.url);
        context.insert(
            "source_dir",
            &layout.build_dir(PlatformTarget::Windows).to_string_lossy(),
        );
        context.insert("output_dir", &layout.release_dir(version).to_string_lossy());
        context.insert("output_base", &format!("{product}-Installer"));
        context.insert("executable", &PlatformTarget::Windows.executable_name(product));

        let mut tera = Tera::default();
        tera.render_str(INSTALLER_TEMPLATE, &context).map_err(|e| DeskshipError::Configuration {
            reason: format!("failed to render installer script: {e}"),
        })
    }

    /// Write the script into the release folder and compile the installer.
    ///
    /// Returns the path of `{Product}-Installer.exe`.
    ///
    /// # Errors
    ///
    /// - [`DeskshipError::Configuration`] when no compiler is configured
    /// - [`DeskshipError::ExternalTool`] when the compiler fails
    /// - [`DeskshipError::Integrity`] when it exits cleanly without producing the installer
    pub async fn build(&self, layout: &OutputLayout, version: &str) -> Result<PathBuf> {
        let compiler = self.config.compiler.as_deref().ok_or_else(|| DeskshipError::Configuration {
            reason: "installer enabled but no installer compiler configured".to_string(),
        })?;

        let release_dir = layout.release_dir(version);
        ensure_dir(&release_dir)?;

        let script_path = layout.installer_script_path(version);
        let script = self.render_script(layout, version)?;
        tokio::fs::write(&script_path, script).await?;
        tracing::debug!("Wrote installer script {}", script_path.display());

        ToolCommand::new(compiler.as_os_str())
            .arg("/Q")
            .arg(script_path.as_os_str())
            .current_dir(&release_dir)
            .with_timeout(Some(DEFAULT_TOOL_TIMEOUT))
            .with_context("installer")
            .execute()
            .await?;

        let installer = layout.installer_path(version);
        if !installer.is_file() {
            return Err(DeskshipError::Integrity {
                reason: format!("installer compiler did not produce {}", installer.display()),
            });
        }
        Ok(installer)
    }
}

/// `AppId` value for the script.
///
/// Inno Setup treats `{` as a constant prefix, so a GUID written with braces
/// needs its opening brace doubled. Without a configured id the product name
/// is used.
fn inno_app_id(app_id: &str, product: &str) -> String {
    let app_id = app_id.trim();
    if app_id.is_empty() {
        product.to_string()
    } else if app_id.starts_with('{') {
        format!("{{{app_id}")
    } else {
        app_id.to_string()
    }
}
