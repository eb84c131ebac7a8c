//! Test utilities for deskship
//!
//! Helpers shared by unit tests and the integration suite: one-time logging
//! setup, a stand-in [`Compiler`], executable stand-ins for external tools,
//! release host JSON fixtures and zip fixtures for the updater.
//!
//! # Example
//!
//! ```rust,no_run
//! use deskship::test_utils::{StubCompiler, init_test_logging};
//! use deskship::pipeline::Orchestrator;
//! use std::sync::Arc;
//!
//! init_test_logging(None);
//! let compiler = Arc::new(StubCompiler::default());
//! let orchestrator = Orchestrator::new(compiler.clone()).unwrap();
//! ```

use crate::core::{DeskshipError, Result};
use crate::pipeline::{BuildRequest, Compiler};
use crate::platform::PlatformTarget;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; without either, nothing is
/// installed. Safe to call from every test.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true) // "tool" and "host" targets
            .with_thread_ids(false)
            .try_init();
    });
}

type BuildHook = Box<dyn Fn(&BuildRequest) + Send + Sync>;

/// Compiler that writes a small executable per platform and records the order.
#[derive(Default)]
pub struct StubCompiler {
    built: Mutex<Vec<PlatformTarget>>,
    fail_on: Option<PlatformTarget>,
    on_build: Option<BuildHook>,
}

impl StubCompiler {
    /// Fail the build of `platform` with a compiler error.
    #[must_use]
    pub fn failing_on(platform: PlatformTarget) -> Self {
        Self {
            fail_on: Some(platform),
            ..Self::default()
        }
    }

    /// Run `hook` after each successful build.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn(&BuildRequest) + Send + Sync + 'static) -> Self {
        self.on_build = Some(Box::new(hook));
        self
    }

    /// Platforms built so far, in order.
    pub fn built(&self) -> Vec<PlatformTarget> {
        self.built.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl Compiler for StubCompiler {
    fn build(&self, request: &BuildRequest) -> Result<()> {
        if self.fail_on == Some(request.platform) {
            return Err(DeskshipError::ExternalTool {
                tool: "compiler".into(),
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("error: build for {} failed", request.platform),
            });
        }

        let exe = request.executable_path();
        if request.platform == PlatformTarget::MacOS {
            let macos = exe.join("Contents/MacOS");
            std::fs::create_dir_all(&macos)?;
            std::fs::write(macos.join(&request.product), request.version.as_bytes())?;
        } else {
            std::fs::write(&exe, request.version.as_bytes())?;
        }

        if let Ok(mut built) = self.built.lock() {
            built.push(request.platform);
        }
        if let Some(hook) = &self.on_build {
            hook(request);
        }
        Ok(())
    }
}

/// Release record as the host returns it.
///
/// `assets` are `(name, download_url)` pairs.
pub fn release_json(id: u64, tag: &str, prerelease: bool, assets: &[(&str, &str)]) -> Value {
    let assets: Vec<Value> = assets
        .iter()
        .enumerate()
        .map(|(i, (name, url))| {
            json!({
                "id": id * 100 + i as u64,
                "name": name,
                "browser_download_url": url,
                "url": url,
                "size": 0,
                "content_type": "application/octet-stream",
            })
        })
        .collect();
    json!({
        "id": id,
        "tag_name": tag,
        "name": tag,
        "prerelease": prerelease,
        "draft": false,
        "upload_url": format!("https://uploads.example.com/releases/{id}/assets{{?name,label}}"),
        "html_url": format!("https://example.com/releases/{tag}"),
        "assets": assets,
    })
}

/// Write a zip archive at `path` holding `files` (`(relative name, content)`).
pub fn write_zip(path: &Path, files: &[(&str, &str)]) -> Result<()> {
    use std::io::Write;
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in files {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

/// Write an executable shell script named `name` into `dir`.
///
/// Every invocation appends `name args...` to `dir/calls.log` before running `body`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    let log = dir.join("calls.log");
    let script = format!("#!/bin/sh\necho \"{name} $*\" >> \"{}\"\n{body}\n", log.display());
    std::fs::write(&path, script).unwrap_or_else(|e| panic!("writing {}: {e}", path.display()));
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .unwrap_or_else(|e| panic!("chmod {}: {e}", path.display()));
    path
}

/// Lines recorded by [`fake_tool`] scripts in `dir`.
pub fn tool_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .map(|log| log.lines().map(String::from).collect())
        .unwrap_or_default()
}
