//! Command-line interface for deskship.
//!
//! Release commands drive the pipeline from a `deskship.toml`:
//!
//! - `run` - build, sign, package, create installers and publish
//! - `build` - build the selected platforms only
//! - `package` - zip existing build output into a release folder
//! - `trigger-dmg` - ask the release host to build the macOS disk image
//! - `validate` - report everything a run would reject up front
//!
//! Update commands act as the client side, the way a deployed application
//! uses [`UpdateResolver`](crate::updater::UpdateResolver):
//!
//! - `check-update` - look for a newer release
//! - `update` - download, verify and install it
//!
//! # Global options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only
//! - `--config` / `-c`: configuration file (default `deskship.toml`, or `DESKSHIP_CONFIG`)
//! - `--no-progress`: no spinners or progress bars
//!
//! Commands return an [`ExitCode`]: a run that fails or is cancelled exits
//! with failure even though the command itself completed.

mod release;
mod update;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Settings derived from the global flags.
///
/// Passed explicitly to commands instead of being written into the process
/// environment.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level for the subscriber (`None` keeps `RUST_LOG` or the default).
    pub log_level: Option<String>,

    /// Disable progress indicators.
    pub no_progress: bool,

    /// Configuration file given with `--config`.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply process-wide settings.
    pub fn apply(&self) {
        if self.no_progress {
            crate::utils::progress::disable_progress();
        }
    }
}

/// How command results are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Colored, human-readable lines.
    Text,
    /// A single JSON document on stdout.
    Json,
}

/// Desktop release pipeline and self-update client.
#[derive(Parser)]
#[command(
    name = "deskship",
    about = "Build, sign, package and publish desktop releases",
    version,
    author,
    long_about = "deskship turns a configured desktop product into platform builds, \
                  signed bundles, installers and a published release, and updates \
                  installed copies from the release host."
)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable progress bars and spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full release pipeline
    Run(release::RunCommand),

    /// Build the selected platforms without packaging
    Build(release::BuildCommand),

    /// Package existing build output into a release folder
    Package(release::PackageCommand),

    /// Dispatch the disk image workflow for a published release
    #[command(name = "trigger-dmg")]
    TriggerDmg(release::TriggerDmgCommand),

    /// Check the configuration without running anything
    Validate(release::ValidateCommand),

    /// Check the release host for a newer version
    #[command(name = "check-update")]
    CheckUpdate(update::CheckUpdateCommand),

    /// Download and install a newer version
    Update(update::UpdateCommand),
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Configuration, host and tool errors not already folded into a run outcome.
    pub async fn execute(self) -> Result<ExitCode> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Settings from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Execute with explicit settings.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_with_config(self, config: CliConfig) -> Result<ExitCode> {
        config.apply();
        let config_path = config.config_path;

        match self.command {
            Commands::Run(cmd) => cmd.execute(config_path).await,
            Commands::Build(cmd) => cmd.execute(config_path).await,
            Commands::Package(cmd) => cmd.execute(config_path).await,
            Commands::TriggerDmg(cmd) => cmd.execute(config_path).await,
            Commands::Validate(cmd) => cmd.execute(config_path).await,
            Commands::CheckUpdate(cmd) => cmd.execute(config_path).await,
            Commands::Update(cmd) => cmd.execute(config_path).await,
        }
    }
}
