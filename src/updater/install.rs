//! Putting a downloaded update in place.
//!
//! A running executable cannot overwrite itself, so archives are never copied
//! over the installation from inside this process. Instead the archive is
//! extracted into a staging directory and a small swap script is launched
//! detached. The script waits for this process to exit, copies the staged
//! files over the installation directory in one step, removes the staging
//! directory, relaunches the application and deletes itself.
//!
//! Disk images (macOS) are mounted and the bundle inside is copied into the
//! applications directory. If that copy fails, the volume is opened for the
//! user to finish by hand and is detached after [`UNMOUNT_DELAY`].
//!
//! Until the swap script runs or the bundle is renamed into place, every
//! failure leaves the installed application exactly as it was.

use super::state::{StateHandle, UpdateState};
use crate::archive::ArchiveService;
use crate::config::UpdaterConfig;
use crate::constants::{APPLICATIONS_DIR, DISK_IMAGE_TIMEOUT, SWAP_POLL_SECONDS, UNMOUNT_DELAY};
use crate::core::{DeskshipError, Result};
use crate::platform::AssetKind;
use crate::process::ToolCommand;
use crate::utils::{TempDir, copy_dir_all, ensure_dir, remove_dir_all};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tera::{Context as TeraContext, Tera};

const UNIX_SWAP_TEMPLATE: &str = r#"#!/bin/sh
# deskship update swap
while kill -0 {{ pid }} 2>/dev/null; do
  sleep {{ poll }}
done
cp -R {{ payload }}/. {{ install_dir }}/ || exit 1
rm -rf {{ staging }}
{{ relaunch }}
rm -f "$0"
"#;

const WINDOWS_SWAP_TEMPLATE: &str = r#"@echo off
rem deskship update swap
:wait
tasklist /FI "PID eq {{ pid }}" 2>NUL | find "{{ pid }}" >NUL
if not errorlevel 1 (
  timeout /t {{ poll }} /nobreak >NUL
  goto wait
)
xcopy "{{ payload }}\*" "{{ install_dir }}\" /E /Y /I /Q >NUL || exit /b 1
rmdir /S /Q "{{ staging }}"
{{ relaunch }}
(goto) 2>nul & del "%~f0"
"#;

/// Programs the installer shells out to.
#[derive(Debug, Clone)]
pub struct InstallTools {
    /// Disk image tool.
    pub hdiutil: OsString,
    /// Opens bundles and folders.
    pub open: OsString,
    /// Interpreter for the swap script.
    pub shell: OsString,
}

impl Default for InstallTools {
    fn default() -> Self {
        Self {
            hdiutil: "hdiutil".into(),
            open: "open".into(),
            shell: if cfg!(windows) { "cmd".into() } else { "sh".into() },
        }
    }
}

/// What the installer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A swap script is waiting for this process to exit.
    SwapScheduled {
        /// The detached script.
        script: PathBuf,
    },
    /// The new bundle was copied into place and launched.
    Relaunched {
        /// The installed bundle.
        app: PathBuf,
    },
    /// Automatic installation failed; the mounted volume was opened instead.
    ManualInstall {
        /// Mount point, detached after a delay.
        volume: PathBuf,
    },
}

impl InstallOutcome {
    /// Whether the caller must exit for the update to take effect.
    #[must_use]
    pub const fn requires_exit(&self) -> bool {
        matches!(self, Self::SwapScheduled { .. } | Self::Relaunched { .. })
    }
}

/// An extracted update waiting to be swapped in.
///
/// Dropping it without launching removes the staging directory and the
/// script.
#[derive(Debug)]
pub struct StagedSwap {
    staging: TempDir,
    /// Extracted files inside the staging directory.
    pub payload: PathBuf,
    /// The swap script.
    pub script: PathBuf,
    /// Number of files extracted.
    pub files: usize,
}

impl StagedSwap {
    /// Staging directory, removed by the script once it has copied the payload.
    #[must_use]
    pub fn staging(&self) -> &Path {
        self.staging.path()
    }
}

impl Drop for StagedSwap {
    fn drop(&mut self) {
        if self.staging.is_kept() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.script) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", self.script.display(), e);
            }
        }
    }
}

/// Installs downloaded assets over an installation directory.
#[derive(Debug, Clone)]
pub struct Installer {
    install_dir: PathBuf,
    relaunch: PathBuf,
    pid: u32,
    scratch_dir: PathBuf,
    applications_dir: PathBuf,
    unmount_delay: Duration,
    tools: InstallTools,
    archive: ArchiveService,
}

impl Installer {
    /// Installer replacing `install_dir` and relaunching `relaunch` (an
    /// executable or a `.app` bundle) after this process exits.
    pub fn new(install_dir: impl Into<PathBuf>, relaunch: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            relaunch: relaunch.into(),
            pid: std::process::id(),
            scratch_dir: std::env::temp_dir(),
            applications_dir: PathBuf::from(APPLICATIONS_DIR),
            unmount_delay: UNMOUNT_DELAY,
            tools: InstallTools::default(),
            archive: ArchiveService::new(),
        }
    }

    /// Installer for the running executable.
    ///
    /// Inside a macOS bundle (`App.app/Contents/MacOS/App`) the bundle is
    /// relaunched and its parent directory is the installation directory.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Io`] if the executable path is unavailable.
    pub fn for_current_process(config: &UpdaterConfig) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let (default_dir, relaunch) = install_location(&exe);
        let install_dir = config.install_dir.clone().unwrap_or(default_dir);
        Ok(Self::new(install_dir, relaunch))
    }

    /// Wait for a different process before swapping.
    #[must_use]
    pub const fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Stage extracted files and scripts under `dir`.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Copy disk image bundles into `dir` instead of `/Applications`.
    #[must_use]
    pub fn with_applications_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.applications_dir = dir.into();
        self
    }

    /// Detach a volume left open for manual installation after `delay`.
    #[must_use]
    pub const fn with_unmount_delay(mut self, delay: Duration) -> Self {
        self.unmount_delay = delay;
        self
    }

    /// Use different programs.
    #[must_use]
    pub fn with_tools(mut self, tools: InstallTools) -> Self {
        self.tools = tools;
        self
    }

    /// Directory the update replaces.
    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Install the downloaded `asset`.
    ///
    /// # Errors
    ///
    /// Fails before anything in the installation directory is touched: when
    /// the archive cannot be extracted, the disk image cannot be mounted, or
    /// the swap script cannot be written or launched.
    pub async fn install(
        &self,
        asset: &Path,
        kind: AssetKind,
        state: &StateHandle,
    ) -> Result<InstallOutcome> {
        match kind {
            AssetKind::Archive => {
                state.set(UpdateState::Extracting);
                let staged = self.stage_archive(asset).await?;
                state.set(UpdateState::Installing);
                self.launch_swap(staged)
            }
            AssetKind::DiskImage => self.install_disk_image(asset, state).await,
        }
    }

    /// Extract `archive` into a new staging directory and write the swap script.
    ///
    /// Nothing is left behind on failure.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Integrity`] when the archive is corrupt or empty.
    pub async fn stage_archive(&self, archive: &Path) -> Result<StagedSwap> {
        let staging = TempDir::new_in(&self.scratch_dir, "update")?;
        let payload = staging.path().join("payload");

        let files = self.archive.extract(archive, &payload).await?;
        if files == 0 {
            return Err(DeskshipError::Integrity {
                reason: format!("{} contains no files", archive.display()),
            });
        }
        tracing::info!("Staged {} files in {}", files, payload.display());

        let script = self.scratch_dir.join(format!(
            "deskship_swap_{}.{}",
            uuid::Uuid::new_v4(),
            if cfg!(windows) { "bat" } else { "sh" }
        ));
        let content = self.swap_script(&payload, staging.path())?;
        let staged = StagedSwap {
            staging,
            payload,
            script,
            files,
        };
        tokio::fs::write(&staged.script, content).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&staged.script, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(staged)
    }

    /// Launch the swap script detached and hand the staging directory to it.
    ///
    /// If the script cannot be started, the staging directory and the script
    /// are removed.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::ToolNotFound`] if the shell cannot be started.
    pub fn launch_swap(&self, mut staged: StagedSwap) -> Result<InstallOutcome> {
        let script = staged.script.as_os_str();
        if cfg!(windows) {
            spawn_detached(&self.tools.shell, &[OsStr::new("/C"), script])?;
        } else {
            spawn_detached(&self.tools.shell, &[script])?;
        }
        staged.staging.disarm();
        tracing::info!(
            "Update staged; {} will replace {} once process {} exits",
            staged.script.display(),
            self.install_dir.display(),
            self.pid
        );
        Ok(InstallOutcome::SwapScheduled {
            script: staged.script.clone(),
        })
    }

    /// Render the swap script for this platform.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Configuration`] if the template fails to render.
    pub fn swap_script(&self, payload: &Path, staging: &Path) -> Result<String> {
        let mut context = TeraContext::new();
        context.insert("pid", &self.pid);
        context.insert("poll", &SWAP_POLL_SECONDS);

        let template = if cfg!(windows) {
            context.insert("payload", &payload.to_string_lossy());
            context.insert("install_dir", &self.install_dir.to_string_lossy());
            context.insert("staging", &staging.to_string_lossy());
            context.insert("relaunch", &format!("start \"\" \"{}\"", self.relaunch.display()));
            WINDOWS_SWAP_TEMPLATE
        } else {
            context.insert("payload", &sh_quote(payload));
            context.insert("install_dir", &sh_quote(&self.install_dir));
            context.insert("staging", &sh_quote(staging));
            context.insert("relaunch", &self.unix_relaunch_line());
            UNIX_SWAP_TEMPLATE
        };

        Tera::default().render_str(template, &context).map_err(|e| DeskshipError::Configuration {
            reason: format!("failed to render swap script: {e}"),
        })
    }

    fn unix_relaunch_line(&self) -> String {
        if is_bundle(&self.relaunch) {
            format!(
                "{} -n {} >/dev/null 2>&1 &",
                sh_quote(Path::new(&self.tools.open)),
                sh_quote(&self.relaunch)
            )
        } else {
            format!("{} >/dev/null 2>&1 &", sh_quote(&self.relaunch))
        }
    }

    async fn install_disk_image(
        &self,
        image: &Path,
        state: &StateHandle,
    ) -> Result<InstallOutcome> {
        state.set(UpdateState::Extracting);
        let mount = self.scratch_dir.join(format!("deskship_mount_{}", uuid::Uuid::new_v4()));
        ensure_dir(&mount)?;

        let attached = ToolCommand::new(self.tools.hdiutil.clone())
            .args(["attach", "-nobrowse", "-noautoopen", "-mountpoint"])
            .arg(mount.as_os_str())
            .arg(image.as_os_str())
            .with_timeout(Some(DISK_IMAGE_TIMEOUT))
            .with_context("mount update")
            .execute()
            .await;
        if let Err(e) = attached {
            let _ = std::fs::remove_dir(&mount);
            return Err(e);
        }

        state.set(UpdateState::Installing);
        match self.copy_bundle_from(&mount).await {
            Ok(app) => {
                self.detach(&mount).await;
                let launched =
                    spawn_detached(&self.tools.open, &[OsStr::new("-n"), app.as_os_str()]);
                if let Err(e) = launched {
                    let _ = std::fs::remove_dir(&mount);
                    return Err(e);
                }
                tracing::info!("Installed and launched {}", app.display());
                Ok(InstallOutcome::Relaunched {
                    app,
                })
            }
            Err(e) => {
                tracing::warn!(
                    "Automatic installation failed: {}. Opening the disk image instead",
                    e
                );
                if let Err(open_error) = spawn_detached(&self.tools.open, &[mount.as_os_str()]) {
                    self.detach(&mount).await;
                    return Err(open_error);
                }
                self.schedule_unmount(&mount);
                Ok(InstallOutcome::ManualInstall {
                    volume: mount,
                })
            }
        }
    }

    async fn copy_bundle_from(&self, volume: &Path) -> Result<PathBuf> {
        let bundle = find_bundle(volume)?;
        let name = bundle.file_name().map(OsString::from).ok_or_else(|| DeskshipError::Integrity {
            reason: format!("unnamed bundle in {}", volume.display()),
        })?;
        let dest = self.applications_dir.join(name);

        let target = dest.clone();
        tokio::task::spawn_blocking(move || replace_bundle(&bundle, &target))
            .await
            .map_err(|e| {
                DeskshipError::Io(std::io::Error::other(format!("copy task failed: {e}")))
            })??;
        Ok(dest)
    }

    async fn detach(&self, mount: &Path) {
        let detached = ToolCommand::new(self.tools.hdiutil.clone())
            .arg("detach")
            .arg(mount.as_os_str())
            .arg("-quiet")
            .with_timeout(Some(DISK_IMAGE_TIMEOUT))
            .with_context("unmount update")
            .execute()
            .await;
        match detached {
            Ok(_) => {
                let _ = std::fs::remove_dir(mount);
            }
            Err(e) => tracing::warn!("Failed to detach {}: {}", mount.display(), e),
        }
    }

    fn schedule_unmount(&self, mount: &Path) {
        let command = format!(
            "sleep {}; {} detach {} -quiet",
            self.unmount_delay.as_secs(),
            sh_quote(Path::new(&self.tools.hdiutil)),
            sh_quote(mount)
        );
        match spawn_detached(&self.tools.shell, &[OsStr::new("-c"), OsStr::new(&command)]) {
            Ok(()) => tracing::info!(
                "{} will be detached in {} seconds",
                mount.display(),
                self.unmount_delay.as_secs()
            ),
            Err(e) => tracing::warn!("Failed to schedule unmount of {}: {}", mount.display(), e),
        }
    }
}

/// Default installation directory and relaunch target for `exe`.
fn install_location(exe: &Path) -> (PathBuf, PathBuf) {
    if let Some(bundle) = exe.ancestors().find(|p| is_bundle(p)) {
        let dir = bundle.parent().map_or_else(|| bundle.to_path_buf(), Path::to_path_buf);
        return (dir, bundle.to_path_buf());
    }
    let dir = exe.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    (dir, exe.to_path_buf())
}

fn is_bundle(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "app")
}

/// First `.app` bundle at the top of `volume`.
fn find_bundle(volume: &Path) -> Result<PathBuf> {
    let mut bundles: Vec<PathBuf> = std::fs::read_dir(volume)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_bundle(path) && path.is_dir())
        .collect();
    bundles.sort();
    bundles.into_iter().next().ok_or_else(|| DeskshipError::Integrity {
        reason: format!("no application bundle in {}", volume.display()),
    })
}

/// Copy `src` next to `dest`, then rename it into place.
///
/// The previous bundle is moved aside first and restored if the final
/// rename fails, so `dest` is either the old bundle or the complete new one.
fn replace_bundle(src: &Path, dest: &Path) -> Result<()> {
    let staged = sibling(dest, "deskship-new");
    let previous = sibling(dest, "deskship-old");
    remove_dir_all(&staged)?;
    remove_dir_all(&previous)?;

    if let Err(e) = copy_dir_all(src, &staged) {
        let _ = remove_dir_all(&staged);
        return Err(e);
    }

    let had_previous = dest.exists();
    if had_previous {
        if let Err(e) = std::fs::rename(dest, &previous) {
            let _ = remove_dir_all(&staged);
            return Err(e.into());
        }
    }
    if let Err(e) = std::fs::rename(&staged, dest) {
        if had_previous {
            let _ = std::fs::rename(&previous, dest);
        }
        let _ = remove_dir_all(&staged);
        return Err(e.into());
    }
    if had_previous {
        if let Err(e) = remove_dir_all(&previous) {
            tracing::warn!("Failed to remove previous bundle {}: {}", previous.display(), e);
        }
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

/// Quote `path` for a POSIX shell.
fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Start `program` in its own process group with no stdio, without waiting.
fn spawn_detached(program: &OsStr, args: &[&OsStr]) -> Result<()> {
    let mut command = std::process::Command::new(program);
    command.args(args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    tracing::debug!(target: "tool", "Spawning detached: {:?}", command);
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeskshipError::ToolNotFound {
                tool: program.to_string_lossy().into_owned(),
            }
        } else {
            DeskshipError::Io(e)
        }
    })?;
    // Reap the child if it finishes while we are still running.
    std::thread::spawn(move || child.wait());
    Ok(())
}
