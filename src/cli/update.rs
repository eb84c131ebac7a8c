//! Self-update commands.
//!
//! These act on behalf of an installed application: the updater settings come
//! from a standalone file (`--updater-config`) or the `[updater]` table of the
//! release configuration, and the running version defaults to
//! `[product].version`.

use super::OutputFormat;
use crate::config::{ReleaseConfig, UpdaterConfig};
use crate::platform::PlatformTarget;
use crate::updater::{CheckOutcome, InstallOutcome, Installer, UpdateChecker, UpdateResolver};
use anyhow::{Context, Result, anyhow};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Where the updater settings and running version come from.
#[derive(Args, Debug)]
pub struct UpdaterArgs {
    /// Standalone updater configuration file
    #[arg(long, value_name = "PATH")]
    pub updater_config: Option<PathBuf>,

    /// Version of the installed application (default: [product].version)
    #[arg(long, value_name = "VERSION")]
    pub current_version: Option<String>,

    /// Match assets published for this platform instead of the running one
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Option<PlatformTarget>,
}

impl UpdaterArgs {
    async fn resolve(
        &self,
        config_path: Option<PathBuf>,
    ) -> Result<(UpdaterConfig, UpdateResolver)> {
        let release = if self.updater_config.is_none() || self.current_version.is_none() {
            let path = config_path.unwrap_or_else(ReleaseConfig::default_path);
            Some(ReleaseConfig::load_from(&path).await?)
        } else {
            None
        };

        let config = match &self.updater_config {
            Some(path) => UpdaterConfig::load_from(path).await?,
            None => release
                .as_ref()
                .and_then(|release| release.updater.clone())
                .ok_or_else(|| anyhow!("No [updater] table in the configuration file"))?,
        };

        let current_version = self
            .current_version
            .clone()
            .or_else(|| release.as_ref().map(|release| release.product.version.clone()))
            .ok_or_else(|| anyhow!("Pass --current-version with --updater-config"))?;

        let mut resolver = UpdateResolver::new(config.clone(), current_version);
        if let Some(platform) = self.platform {
            resolver = resolver.with_platform(platform);
        }
        Ok((config, resolver))
    }
}

/// Look for a newer release.
#[derive(Args, Debug)]
pub struct CheckUpdateCommand {
    #[command(flatten)]
    pub updater: UpdaterArgs,

    /// Answer from the check cache while it is fresh
    #[arg(long)]
    pub cached: bool,

    /// Output format: text or json
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl CheckUpdateCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        let (config, resolver) = self.updater.resolve(config_path).await?;
        let current = resolver.current_version().to_string();

        let doc = if self.cached {
            let checker = UpdateChecker::new(resolver, &config);
            let latest = checker.check().await?;
            json!({
                "current_version": current,
                "status": if latest.is_some() { "update-available" } else { "up-to-date" },
                "latest_version": latest,
            })
        } else {
            let outcome = resolver.check().await.context("Update check failed")?;
            outcome_json(&current, &outcome)
        };

        if self.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&doc)?);
            return Ok(ExitCode::SUCCESS);
        }

        let latest = doc["latest_version"].as_str().unwrap_or(&current);
        match doc["status"].as_str() {
            Some("update-available") => {
                println!("{} Update available: {} -> {}", "↑".green(), current, latest.bold());
                if let Some(asset) = doc["asset"].as_str() {
                    println!("  Asset: {asset}");
                }
            }
            Some("no-compatible-asset") => {
                println!(
                    "{} {} is out, but has no asset for this platform",
                    "⚠".yellow(),
                    latest
                );
                if let Some(expected) = doc["expected"].as_array() {
                    let names: Vec<&str> = expected.iter().filter_map(|v| v.as_str()).collect();
                    println!("  Expected one of: {}", names.join(", "));
                }
            }
            _ => println!("{} {} is up to date", "✓".green(), current),
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn outcome_json(current: &str, outcome: &CheckOutcome) -> serde_json::Value {
    match outcome {
        CheckOutcome::UpToDate { latest } => json!({
            "current_version": current,
            "status": "up-to-date",
            "latest_version": latest,
        }),
        CheckOutcome::UpdateAvailable(candidate) => json!({
            "current_version": current,
            "status": "update-available",
            "latest_version": candidate.version,
            "asset": candidate.asset.name,
            "download_url": candidate.download_url,
        }),
        CheckOutcome::NoCompatibleAsset { version, expected } => json!({
            "current_version": current,
            "status": "no-compatible-asset",
            "latest_version": version,
            "expected": expected,
        }),
    }
}

/// Download and install a newer release.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    #[command(flatten)]
    pub updater: UpdaterArgs,

    /// Installation directory to replace (default: [updater].install_dir)
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Executable or bundle to start after the swap
    /// (default: the product's executable in the installation directory)
    #[arg(long, value_name = "PATH")]
    pub relaunch: Option<PathBuf>,

    /// Process the swap waits for (default: this process)
    #[arg(long)]
    pub pid: Option<u32>,
}

impl UpdateCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<ExitCode> {
        let (config, mut resolver) = self.updater.resolve(config_path).await?;

        if let Some(installer) = self.installer(&config)? {
            resolver = resolver.with_installer(installer);
        }

        let outcome = resolver.update().await.context("Update failed")?;
        let Some(outcome) = outcome else {
            println!("{} {} is up to date", "✓".green(), resolver.current_version());
            return Ok(ExitCode::SUCCESS);
        };

        match &outcome {
            InstallOutcome::SwapScheduled { script } => {
                println!(
                    "{} Update staged; it is swapped in once this process exits",
                    "✓".green()
                );
                tracing::debug!("Swap script: {}", script.display());
            }
            InstallOutcome::Relaunched { app } => {
                println!("{} Installed and relaunched {}", "✓".green(), app.display());
            }
            InstallOutcome::ManualInstall { volume } => {
                println!(
                    "{} Automatic installation failed; drag the application from {} to finish",
                    "⚠".yellow(),
                    volume.display()
                );
            }
        }

        if outcome.requires_exit() {
            std::io::stdout().flush().ok();
            std::process::exit(0);
        }
        Ok(ExitCode::SUCCESS)
    }

    /// Installer for an application other than this binary, when an
    /// installation directory is known.
    fn installer(&self, config: &UpdaterConfig) -> Result<Option<Installer>> {
        let install_dir = self.install_dir.clone().or_else(|| config.install_dir.clone());
        let Some(install_dir) = install_dir else {
            return Ok(None);
        };

        let relaunch = match &self.relaunch {
            Some(path) => path.clone(),
            None => {
                let platform = self
                    .updater
                    .platform
                    .or_else(PlatformTarget::current)
                    .ok_or_else(|| {
                        anyhow!("Cannot tell which executable to relaunch; pass --relaunch")
                    })?;
                install_dir.join(platform.executable_name(&config.product_name))
            }
        };

        let mut installer = Installer::new(install_dir, relaunch);
        if let Some(pid) = self.pid {
            installer = installer.with_pid(pid);
        }
        Ok(Some(installer))
    }
}
