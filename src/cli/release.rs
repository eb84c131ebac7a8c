//! Release pipeline commands.

use super::OutputFormat;
use crate::config::{ReleaseConfig, persist_product_version};
use crate::pipeline::{Orchestrator, RunMode, RunOutcome, RunStatus, StageOutcome};
use crate::platform::PlatformTarget;
use crate::utils::ProgressBar;
use crate::version::VersionPolicy;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

/// How often the spinner picks up the run's status line.
const STATUS_POLL: Duration = Duration::from_millis(200);

/// Options shared by every pipeline command.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Platforms to process instead of the configured ones (repeat or separate with commas)
    #[arg(long = "platform", value_name = "PLATFORM", value_delimiter = ',')]
    pub platforms: Vec<PlatformTarget>,

    /// Output format: text or json
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl PipelineArgs {
    fn apply(&self, config: &mut ReleaseConfig) {
        if !self.platforms.is_empty() {
            config.platforms = self.platforms.iter().copied().collect();
        }
    }

    async fn load(&self, config_path: Option<PathBuf>) -> Result<(PathBuf, ReleaseConfig)> {
        let path = config_path.unwrap_or_else(ReleaseConfig::default_path);
        let mut config = ReleaseConfig::load_from(&path).await?;
        self.apply(&mut config);
        Ok((path, config))
    }
}

/// Run every enabled stage for a new version.
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Release exactly this version instead of incrementing the patch number
    #[arg(long, value_name = "VERSION")]
    pub release_version: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl RunCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        let (path, mut config) = self.pipeline.load(config_path).await?;
        if let Some(version) = self.release_version {
            config.version.policy = VersionPolicy::Explicit;
            config.version.explicit = version;
        }

        let orchestrator =
            Orchestrator::from_config(&config).context("Failed to start the build thread")?;
        let outcome = drive(&orchestrator, &config, RunMode::Full).await;

        if outcome.succeeded() && config.version.policy == VersionPolicy::AutoIncrement {
            if let Some(version) = outcome.version.as_deref() {
                if version != config.product.version.trim() {
                    persist_product_version(&path, version).await?;
                    info!("Recorded version {} in {}", version, path.display());
                }
            }
        }

        report(&outcome, self.pipeline.format)?;
        Ok(exit_code(&outcome))
    }
}

/// Build the selected platforms at the current version.
#[derive(Args, Debug)]
pub struct BuildCommand {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl BuildCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        let (_, config) = self.pipeline.load(config_path).await?;
        let orchestrator =
            Orchestrator::from_config(&config).context("Failed to start the build thread")?;
        let outcome = drive(&orchestrator, &config, RunMode::BuildOnly).await;
        report(&outcome, self.pipeline.format)?;
        Ok(exit_code(&outcome))
    }
}

/// Zip existing build output at the current version.
#[derive(Args, Debug)]
pub struct PackageCommand {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl PackageCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        let (_, config) = self.pipeline.load(config_path).await?;
        let orchestrator =
            Orchestrator::from_config(&config).context("Failed to start the build thread")?;
        let outcome = drive(&orchestrator, &config, RunMode::PackageOnly).await;
        report(&outcome, self.pipeline.format)?;
        Ok(exit_code(&outcome))
    }
}

/// Ask the release host to build and attach the macOS disk image.
#[derive(Args, Debug)]
pub struct TriggerDmgCommand {
    /// Version whose release receives the disk image (default: newest release)
    #[arg(long, value_name = "VERSION")]
    pub release_version: Option<String>,
}

impl TriggerDmgCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        let path = config_path.unwrap_or_else(ReleaseConfig::default_path);
        let config = ReleaseConfig::load_from(&path).await?;
        let orchestrator =
            Orchestrator::from_config(&config).context("Failed to start the build thread")?;

        let release = orchestrator
            .trigger_disk_image(&config, self.release_version.as_deref())
            .await
            .context("Failed to dispatch the disk image workflow")?;

        println!(
            "{} Disk image workflow dispatched for {}",
            "✓".green(),
            release.tag_name.bold()
        );
        if !release.html_url.is_empty() {
            println!("  Release page: {}", release.html_url);
        }
        Ok(ExitCode::SUCCESS)
    }
}

/// Which checks `validate` applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Every enabled stage
    Full,
    /// Build settings only
    Build,
    /// Packaging settings only
    Package,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => Self::Full,
            ModeArg::Build => Self::BuildOnly,
            ModeArg::Package => Self::PackageOnly,
        }
    }
}

/// Report what a run would reject, without running anything.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Checks of which run to apply
    #[arg(long, value_enum, default_value = "full")]
    pub mode: ModeArg,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl ValidateCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        let (path, config) = self.pipeline.load(config_path).await?;
        let orchestrator =
            Orchestrator::from_config(&config).context("Failed to start the build thread")?;
        let failures = orchestrator.validation_failures(&config, self.mode.into());

        match self.pipeline.format {
            OutputFormat::Json => {
                let doc = json!({
                    "config": path,
                    "valid": failures.is_empty(),
                    "failures": failures,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            }
            OutputFormat::Text if failures.is_empty() => {
                println!("{} {} is valid", "✓".green(), path.display());
            }
            OutputFormat::Text => {
                for failure in &failures {
                    println!("{} {}", "✗".red(), failure);
                }
            }
        }

        Ok(if failures.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
}

/// Run `mode` to completion, mirroring its status in a spinner and turning
/// Ctrl-C into a cancellation request.
async fn drive(orchestrator: &Orchestrator, config: &ReleaseConfig, mode: RunMode) -> RunOutcome {
    let monitor = orchestrator.monitor();
    let spinner = ProgressBar::new_spinner();
    let mut ticker = tokio::time::interval(STATUS_POLL);
    let mut cancel_sent = false;

    let run = orchestrator.execute(config, mode);
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            _ = ticker.tick() => spinner.set_message(monitor.status()),
            signal = tokio::signal::ctrl_c(), if !cancel_sent => {
                cancel_sent = true;
                if signal.is_ok() {
                    warn!("Cancellation requested, stopping at the next stage boundary");
                    monitor.request_cancel();
                }
            }
        }
    };

    spinner.finish_and_clear();
    outcome
}

fn report(outcome: &RunOutcome, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    for (stage, result) in &outcome.stages {
        match result {
            StageOutcome::Succeeded => println!("{} {}", "✓".green(), stage),
            StageOutcome::Skipped => {
                println!("{} {} {}", "-".dimmed(), stage, "(skipped)".dimmed());
            }
            StageOutcome::Failed(message) => println!("{} {}: {}", "✗".red(), stage, message),
        }
    }
    for warning in &outcome.warnings {
        println!("{} {}", "⚠".yellow(), warning);
    }

    match outcome.status {
        RunStatus::Succeeded => println!("{} {}", "✓".green().bold(), outcome.message),
        RunStatus::Failed => eprintln!("{} {}", "✗".red().bold(), outcome.message),
        RunStatus::Cancelled => eprintln!("{} {}", "⚠".yellow().bold(), outcome.message),
    }
    if let Some(dir) = &outcome.release_dir {
        println!("  Release folder: {}", dir.display());
    }
    if let Some(url) = &outcome.release_url {
        println!("  Release page: {url}");
    }
    Ok(())
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    if outcome.succeeded() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
