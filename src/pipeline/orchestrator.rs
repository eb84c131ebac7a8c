//! Sequencing of one release run.
//!
//! ```text
//! validate → lock → suspend host refresh
//!   → AssignVersion → Build(each platform) → Sign(Mac) → Package
//!   → Installer(Windows) → Publish(+ disk image workflow)
//! ```
//!
//! Validation runs before anything is written. Cancellation is checked
//! between stages and before every platform build, archive and upload; work
//! already in flight completes first and finished artifacts stay on disk. The
//! first failing stage ends the run and later stages never start. Nothing is
//! retried at this level.

use super::compiler::{BuildRequest, Compiler, CommandCompiler};
use super::executor::BuildExecutor;
use super::hooks::{HostHooks, NoopHooks, SuspendGuard};
use super::installer::InstallerBuilder;
use super::layout::OutputLayout;
use super::lock::RunLock;
use super::publish::{Publisher, signing_params};
use super::run::{PipelineRun, RunMonitor, RunOutcome};
use super::signing::{MacSigner, SigningTools};
use super::stage::{Stage, StageOutcome};
use crate::archive::ArchiveService;
use crate::config::ReleaseConfig;
use crate::config::validation::collect_failures;
use crate::core::{DeskshipError, Result};
use crate::host::Release;
use crate::platform::PlatformTarget;
use crate::utils::fs::has_files;
use crate::utils::{ProgressBar, ensure_dir, remove_dir_all};
use crate::version::{VersionPolicy, assign_version};
use std::path::PathBuf;
use std::sync::Arc;

/// Which part of the pipeline a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every enabled stage, assigning a new version.
    Full,
    /// Build the selected platforms at the current version.
    BuildOnly,
    /// Zip existing build output at the current version.
    PackageOnly,
}

impl RunMode {
    /// Whether `stage` runs in this mode (if enabled in the configuration).
    #[must_use]
    pub const fn includes(self, stage: Stage) -> bool {
        match self {
            Self::Full => true,
            Self::BuildOnly => matches!(stage, Stage::AssignVersion | Stage::Build),
            Self::PackageOnly => matches!(stage, Stage::AssignVersion | Stage::Package),
        }
    }

    /// Snapshot of `config` with the stages outside this mode disabled, so
    /// their settings are not validated.
    fn restrict(self, config: &ReleaseConfig) -> ReleaseConfig {
        let mut config = config.clone();
        if !self.includes(Stage::Sign) {
            config.signing.enabled = false;
            config.signing.notarization.enabled = false;
        }
        if !self.includes(Stage::Installer) {
            config.installer.enabled = false;
        }
        if !self.includes(Stage::Publish) {
            config.publish.enabled = false;
        }
        config
    }
}

/// Paths and URLs the outcome reports, filled in as stages complete.
#[derive(Default)]
struct Produced {
    release_dir: Option<PathBuf>,
    release_url: Option<String>,
}

/// Runs the release pipeline.
///
/// One orchestrator owns one build thread and one [`RunMonitor`]; a second
/// run started while one is in flight is rejected.
///
/// # Examples
///
/// ```rust,no_run
/// use deskship::config::ReleaseConfig;
/// use deskship::pipeline::Orchestrator;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = ReleaseConfig::load_from("deskship.toml".as_ref()).await?;
/// let orchestrator = Orchestrator::from_config(&config)?;
/// let outcome = orchestrator.run(&config).await;
/// println!("{}", outcome.message);
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    monitor: RunMonitor,
    compiler: Arc<dyn Compiler>,
    hooks: Arc<dyn HostHooks>,
    archive: ArchiveService,
    executor: BuildExecutor,
    signing_tools: SigningTools,
    tool_exists: fn(&str) -> bool,
}

fn tool_in_path(tool: &str) -> bool {
    which::which(tool).is_ok()
}

impl Orchestrator {
    /// Orchestrator building with `compiler`.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Io`] if the build thread cannot be started.
    pub fn new(compiler: Arc<dyn Compiler>) -> Result<Self> {
        Ok(Self {
            monitor: RunMonitor::new(),
            compiler,
            hooks: Arc::new(NoopHooks),
            archive: ArchiveService::new(),
            executor: BuildExecutor::start()?,
            signing_tools: SigningTools::default(),
            tool_exists: tool_in_path,
        })
    }

    /// Orchestrator building with the `[build]` command line.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Io`] if the build thread cannot be started.
    pub fn from_config(config: &ReleaseConfig) -> Result<Self> {
        Self::new(Arc::new(CommandCompiler::from_config(&config.build)))
    }

    /// Use `hooks` to suspend host auto refresh during runs.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn HostHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Use a differently configured archive service.
    #[must_use]
    pub const fn with_archive(mut self, archive: ArchiveService) -> Self {
        self.archive = archive;
        self
    }

    /// Use different signing programs.
    #[must_use]
    pub fn with_signing_tools(mut self, tools: SigningTools) -> Self {
        self.signing_tools = tools;
        self
    }

    /// Use a different probe for required external tools.
    #[must_use]
    pub fn with_tool_probe(mut self, tool_exists: fn(&str) -> bool) -> Self {
        self.tool_exists = tool_exists;
        self
    }

    /// Read side of the run state, for status display and cancellation.
    #[must_use]
    pub fn monitor(&self) -> RunMonitor {
        self.monitor.clone()
    }

    /// Run every enabled stage.
    pub async fn run(&self, config: &ReleaseConfig) -> RunOutcome {
        self.execute(config, RunMode::Full).await
    }

    /// Build the selected platforms without signing, packaging or publishing.
    pub async fn build_only(&self, config: &ReleaseConfig) -> RunOutcome {
        self.execute(config, RunMode::BuildOnly).await
    }

    /// Zip the existing build output of the selected platforms.
    pub async fn package_only(&self, config: &ReleaseConfig) -> RunOutcome {
        self.execute(config, RunMode::PackageOnly).await
    }

    /// Dispatch the disk image workflow for an already published release.
    ///
    /// Only the repository and token of `[publish]` are required; the
    /// release tagged for `version` is used, or the newest one.
    ///
    /// # Errors
    ///
    /// Configuration errors when the repository or token is missing, plus
    /// everything [`Publisher::trigger_disk_image`] returns.
    pub async fn trigger_disk_image(
        &self,
        config: &ReleaseConfig,
        version: Option<&str>,
    ) -> Result<Release> {
        if config.publish.token.trim().is_empty() {
            return Err(DeskshipError::Configuration {
                reason: "publish token is empty".to_string(),
            });
        }
        let publisher = Publisher::new(&config.publish)?;
        publisher
            .trigger_disk_image(&config.product.name, version, signing_params(config).as_ref())
            .await
    }

    /// Run the stages of `mode` against a snapshot of `config`.
    pub async fn execute(&self, config: &ReleaseConfig, mode: RunMode) -> RunOutcome {
        let mut run = match self.monitor.begin() {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!("{}", e);
                return RunOutcome::rejected(&e);
            }
        };

        let config = Arc::new(mode.restrict(config));
        let layout = OutputLayout::new(&config.output_root, &config.product.name);
        let mut produced = Produced::default();

        let result = self.execute_stages(&mut run, &config, &layout, mode, &mut produced).await;
        run.finish(result, produced.release_dir, produced.release_url)
    }

    /// Every validation failure for `config` under `mode`, including the compiler preflight.
    #[must_use]
    pub fn validation_failures(&self, config: &ReleaseConfig, mode: RunMode) -> Vec<String> {
        let config = mode.restrict(config);
        let mut failures = collect_failures(&config, &self.tool_exists);
        if mode.includes(Stage::Build) {
            if let Err(failure) = self.compiler.preflight() {
                failures.push(failure);
            }
        }
        failures
    }

    async fn execute_stages(
        &self,
        run: &mut PipelineRun,
        config: &ReleaseConfig,
        layout: &OutputLayout,
        mode: RunMode,
        produced: &mut Produced,
    ) -> Result<()> {
        run.set_status("Validating configuration");
        let failures = self.validation_failures(config, mode);
        if !failures.is_empty() {
            return Err(DeskshipError::Validation { failures });
        }

        let _lock = RunLock::acquire(&layout.lock_path()).await?;
        let _suspended = SuspendGuard::new(self.hooks.as_ref())?;
        let platforms = config.selected_platforms();

        run.checkpoint()?;
        let version = Self::assign_version_stage(run, config, mode)?;

        run.checkpoint()?;
        if mode.includes(Stage::Build) {
            self.build_stage(run, config, layout, &platforms, &version).await?;
        } else {
            run.record(Stage::Build, StageOutcome::Skipped);
        }

        run.checkpoint()?;
        if config.signing.enabled && platforms.contains(&PlatformTarget::MacOS) {
            self.sign_stage(run, config, layout).await?;
        } else {
            run.record(Stage::Sign, StageOutcome::Skipped);
        }

        run.checkpoint()?;
        if mode.includes(Stage::Package) {
            run.enter(Stage::Package, "Packaging release files");
            let release_dir = layout.release_dir(&version);
            ensure_dir(&release_dir)?;
            produced.release_dir = Some(release_dir);
            self.package_stage(run, layout, &platforms, &version).await?;
        } else {
            run.record(Stage::Package, StageOutcome::Skipped);
        }

        run.checkpoint()?;
        if config.installer.enabled && platforms.contains(&PlatformTarget::Windows) {
            run.enter(Stage::Installer, "Generating Windows installer");
            let installer = InstallerBuilder::new(&config.installer, &config.product)
                .build(layout, &version)
                .await?;
            tracing::info!("Installer written to {}", installer.display());
            run.record(Stage::Installer, StageOutcome::Succeeded);
        } else {
            run.record(Stage::Installer, StageOutcome::Skipped);
        }

        run.checkpoint()?;
        if config.publish.enabled {
            run.enter(Stage::Publish, "Publishing release");
            let release_dir = layout.release_dir(&version);
            let publisher = Publisher::new(&config.publish)?;
            let report = publisher.publish(run, config, &version, &release_dir).await?;
            tracing::info!(
                "Published {} ({} uploaded, {} already present)",
                report.release.tag_name,
                report.uploaded.len(),
                report.skipped.len()
            );
            produced.release_url = Some(report.release.html_url);
            run.record(Stage::Publish, StageOutcome::Succeeded);
        } else {
            run.record(Stage::Publish, StageOutcome::Skipped);
        }

        Ok(())
    }

    fn assign_version_stage(
        run: &mut PipelineRun,
        config: &ReleaseConfig,
        mode: RunMode,
    ) -> Result<String> {
        run.enter(Stage::AssignVersion, "Assigning version");

        let current = config.product.version.trim();
        let version = match (mode, config.version.policy) {
            (RunMode::Full, policy) => assign_version(policy, current, &config.version.explicit)?,
            (_, VersionPolicy::Explicit) => config.version.explicit.trim().to_string(),
            (_, VersionPolicy::AutoIncrement) => current.to_string(),
        };
        if version.trim().is_empty() {
            return Err(DeskshipError::Configuration {
                reason: "product version is empty".to_string(),
            });
        }

        tracing::info!("Releasing {} {}", config.product.name, version);
        run.set_version(&version);
        run.record(Stage::AssignVersion, StageOutcome::Succeeded);
        Ok(version)
    }

    async fn build_stage(
        &self,
        run: &mut PipelineRun,
        config: &ReleaseConfig,
        layout: &OutputLayout,
        platforms: &[PlatformTarget],
        version: &str,
    ) -> Result<()> {
        run.enter(Stage::Build, format!("Building {} platform(s)", platforms.len()));
        let working_dir = config
            .build
            .working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let progress = ProgressBar::new(platforms.len() as u64);

        for &platform in platforms {
            run.checkpoint()?;
            run.set_status(format!("Building {platform}"));
            progress.set_message(format!("Building {platform}"));

            let output_dir = layout.build_dir(platform);
            remove_dir_all(&output_dir)?;
            ensure_dir(&output_dir)?;

            let request = BuildRequest {
                platform,
                product: config.product.name.clone(),
                version: version.to_string(),
                output_dir,
                working_dir: working_dir.clone(),
            };
            let compiler = Arc::clone(&self.compiler);
            self.executor.submit(move || compiler.build(&request)).await?;

            tracing::info!("Built {}", platform);
            progress.inc(1);
        }

        progress.finish_and_clear();
        run.record(Stage::Build, StageOutcome::Succeeded);
        Ok(())
    }

    async fn sign_stage(
        &self,
        run: &mut PipelineRun,
        config: &ReleaseConfig,
        layout: &OutputLayout,
    ) -> Result<()> {
        run.enter(Stage::Sign, "Signing macOS bundle");
        let bundle = layout
            .build_dir(PlatformTarget::MacOS)
            .join(PlatformTarget::MacOS.executable_name(&config.product.name));

        let report = MacSigner::new(&config.signing)
            .with_tools(self.signing_tools.clone())
            .sign(&bundle)
            .await?;

        if report.ad_hoc {
            run.warn("macOS bundle was signed ad-hoc; users will see a security warning");
        }
        if let Some(Err(message)) = &report.notarization {
            run.warn(format!("Notarization failed: {message}"));
            run.set_status(format!("Signed, notarization failed: {message}"));
        }

        run.record(Stage::Sign, StageOutcome::Succeeded);
        Ok(())
    }

    async fn package_stage(
        &self,
        run: &mut PipelineRun,
        layout: &OutputLayout,
        platforms: &[PlatformTarget],
        version: &str,
    ) -> Result<()> {
        for &platform in platforms {
            run.checkpoint()?;
            let source = layout.build_dir(platform);
            if !has_files(&source) {
                return Err(DeskshipError::Integrity {
                    reason: format!("no build output for {platform} in {}", source.display()),
                });
            }

            run.set_status(format!("Packaging {platform}"));
            let archive = layout.archive_path(version, platform);
            let files = self.archive.compress_dir(&source, &archive).await?;
            tracing::info!("Packaged {} ({} files)", archive.display(), files);
        }

        run.record(Stage::Package, StageOutcome::Succeeded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunStatus;
    use crate::test_utils::StubCompiler;
    use tempfile::TempDir;

    fn config(root: &std::path::Path) -> ReleaseConfig {
        let mut config = ReleaseConfig::new("App", "1.0.5");
        config.output_root = root.to_path_buf();
        config.platforms.insert(PlatformTarget::Windows);
        config.platforms.insert(PlatformTarget::Linux);
        config
    }

    #[test]
    fn test_mode_stage_sets() {
        assert!(RunMode::Full.includes(Stage::Publish));
        assert!(RunMode::BuildOnly.includes(Stage::Build));
        assert!(!RunMode::BuildOnly.includes(Stage::Package));
        assert!(RunMode::PackageOnly.includes(Stage::Package));
        assert!(!RunMode::PackageOnly.includes(Stage::Build));
    }

    #[tokio::test]
    async fn test_full_run_without_optional_stages() {
        let temp = TempDir::new().unwrap();
        let compiler = Arc::new(StubCompiler::default());
        let orchestrator = Orchestrator::new(compiler.clone()).unwrap();

        let outcome = orchestrator.run(&config(temp.path())).await;
        assert!(outcome.succeeded(), "{}", outcome.message);
        assert_eq!(outcome.version.as_deref(), Some("1.0.6"));
        assert_eq!(
            compiler.built(),
            vec![PlatformTarget::Windows, PlatformTarget::Linux]
        );

        let release_dir = temp.path().join("Releases/v1.0.6");
        assert!(release_dir.join("App-Windows.zip").is_file());
        assert!(release_dir.join("App-Linux.zip").is_file());
        assert_eq!(outcome.release_dir.as_deref(), Some(release_dir.as_path()));
        assert_eq!(outcome.stage(Stage::Sign), Some(&StageOutcome::Skipped));
        assert_eq!(outcome.stage(Stage::Publish), Some(&StageOutcome::Skipped));
        assert!(!orchestrator.monitor().is_processing());
    }

    #[tokio::test]
    async fn test_validation_failure_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();
        let mut config = config(temp.path());
        config.platforms.clear();

        let outcome = orchestrator.run(&config).await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.message.contains("select at least one platform"));
        assert!(outcome.stages.is_empty());
        assert!(!temp.path().join("Builds").exists());
        assert!(orchestrator.monitor().is_error());
    }

    #[tokio::test]
    async fn test_build_failure_stops_the_run() {
        let temp = TempDir::new().unwrap();
        let compiler = Arc::new(StubCompiler::failing_on(PlatformTarget::Windows));
        let orchestrator = Orchestrator::new(compiler.clone()).unwrap();

        let outcome = orchestrator.run(&config(temp.path())).await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(matches!(outcome.stage(Stage::Build), Some(StageOutcome::Failed(_))));
        assert!(outcome.stage(Stage::Package).is_none());
        assert!(compiler.built().is_empty());
        assert!(!temp.path().join("Releases").exists());
    }

    #[tokio::test]
    async fn test_build_only_keeps_version() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();

        let outcome = orchestrator.build_only(&config(temp.path())).await;
        assert!(outcome.succeeded(), "{}", outcome.message);
        assert_eq!(outcome.version.as_deref(), Some("1.0.5"));
        assert!(temp.path().join("Builds/App-Windows/App.exe").is_file());
        assert_eq!(outcome.stage(Stage::Package), Some(&StageOutcome::Skipped));
        assert!(!temp.path().join("Releases").exists());
    }

    #[tokio::test]
    async fn test_package_only_requires_build_output() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();

        let outcome = orchestrator.package_only(&config(temp.path())).await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(matches!(outcome.stage(Stage::Package), Some(StageOutcome::Failed(_))));

        orchestrator.build_only(&config(temp.path())).await;
        let outcome = orchestrator.package_only(&config(temp.path())).await;
        assert!(outcome.succeeded(), "{}", outcome.message);
        assert!(temp.path().join("Releases/v1.0.5/App-Linux.zip").is_file());
    }

    #[tokio::test]
    async fn test_publish_settings_ignored_outside_full_runs() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(StubCompiler::default())).unwrap();
        let mut config = config(temp.path());
        config.publish.enabled = true;

        assert!(!orchestrator.validation_failures(&config, RunMode::Full).is_empty());
        assert!(orchestrator.validation_failures(&config, RunMode::BuildOnly).is_empty());
    }
}
