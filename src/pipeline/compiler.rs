//! The external build step.
//!
//! The pipeline treats the native compiler as opaque: it is asked to produce
//! a directory of output files for one platform. [`CommandCompiler`] runs the
//! configured command line; tests substitute their own [`Compiler`].

use crate::config::BuildConfig;
use crate::core::{DeskshipError, Result};
use crate::platform::PlatformTarget;
use crate::utils::fs::{copy_path, has_files};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Everything a compiler needs to build one platform.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Platform being built.
    pub platform: PlatformTarget,
    /// Product name.
    pub product: String,
    /// Version being released.
    pub version: String,
    /// `Builds/{Product}-{Platform}/`, created empty before the build.
    pub output_dir: PathBuf,
    /// Directory the build runs in.
    pub working_dir: PathBuf,
}

impl BuildRequest {
    /// Expected executable or bundle path inside the output directory.
    #[must_use]
    pub fn executable_path(&self) -> PathBuf {
        self.output_dir.join(self.platform.executable_name(&self.product))
    }
}

/// Produces a platform's build output.
///
/// Builds run on the dedicated build thread, one at a time, so
/// implementations are synchronous.
pub trait Compiler: Send + Sync {
    /// Check that the compiler can run at all; called during validation.
    ///
    /// Returns a human-readable failure message.
    fn preflight(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Build `request.platform` into `request.output_dir`.
    fn build(&self, request: &BuildRequest) -> Result<()>;
}

/// Compiler driven by the `[build]` command line.
///
/// Placeholders in the command and artifact path: `{target}`, `{platform}`,
/// `{executable}`, `{version}`, `{product}`, `{out_dir}`.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: Vec<String>,
    artifact: Option<String>,
}

impl CommandCompiler {
    /// Compiler for a command line and optional artifact path template.
    #[must_use]
    pub const fn new(command: Vec<String>, artifact: Option<String>) -> Self {
        Self {
            command,
            artifact,
        }
    }

    /// Compiler for the `[build]` section.
    #[must_use]
    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(config.command.clone(), config.artifact.clone())
    }

    fn expand(template: &str, request: &BuildRequest) -> String {
        template
            .replace("{target}", request.platform.compiler_target())
            .replace("{platform}", request.platform.label())
            .replace("{executable}", &request.platform.executable_name(&request.product))
            .replace("{version}", &request.version)
            .replace("{product}", &request.product)
            .replace("{out_dir}", &request.output_dir.to_string_lossy())
    }

    fn program_exists(program: &str) -> bool {
        let path = Path::new(program);
        if path.components().count() > 1 {
            path.is_file()
        } else {
            which::which(program).is_ok()
        }
    }
}

impl Compiler for CommandCompiler {
    fn preflight(&self) -> std::result::Result<(), String> {
        let Some(program) = self.command.first() else {
            return Err("build command is empty".to_string());
        };
        if !Self::program_exists(program) {
            return Err(format!("build program '{program}' not found"));
        }
        Ok(())
    }

    fn build(&self, request: &BuildRequest) -> Result<()> {
        let args: Vec<String> = self.command.iter().map(|arg| Self::expand(arg, request)).collect();
        let Some((program, rest)) = args.split_first() else {
            return Err(DeskshipError::Configuration {
                reason: "build command is empty".to_string(),
            });
        };

        tracing::debug!(target: "tool", "({}) Executing: {}", request.platform, args.join(" "));

        let output = Command::new(program)
            .args(rest)
            .current_dir(&request.working_dir)
            .env("DESKSHIP_PLATFORM", request.platform.label())
            .env("DESKSHIP_TARGET", request.platform.compiler_target())
            .env("DESKSHIP_VERSION", &request.version)
            .env("DESKSHIP_OUT_DIR", &request.output_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DeskshipError::ToolNotFound {
                    tool: program.clone(),
                },
                _ => DeskshipError::Io(e),
            })?;

        if !output.status.success() {
            return Err(DeskshipError::ExternalTool {
                tool: program.clone(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        if let Some(artifact) = &self.artifact {
            let source = request.working_dir.join(Self::expand(artifact, request));
            if !source.exists() {
                return Err(DeskshipError::Integrity {
                    reason: format!("build artifact {} was not produced", source.display()),
                });
            }
            let name = source.file_name().map_or_else(
                || request.platform.executable_name(&request.product).into(),
                ToOwned::to_owned,
            );
            copy_path(&source, &request.output_dir.join(name))?;
        }

        if !has_files(&request.output_dir) {
            return Err(DeskshipError::Integrity {
                reason: format!("build produced no files in {}", request.output_dir.display()),
            });
        }

        Ok(())
    }
}
