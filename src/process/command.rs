//! Builder for external tool invocations.
//!
//! Every external program deskship runs (compilers, `codesign`, `security`,
//! `xcrun`, `hdiutil`, installer compilers) goes through [`ToolCommand`] so
//! output capture, timeouts and error reporting behave the same everywhere.

use crate::constants::DEFAULT_TOOL_TIMEOUT;
use crate::core::{DeskshipError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// Captured result of a finished tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit status code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Fluent builder for running an external tool with captured output.
///
/// # Examples
///
/// ```rust,no_run
/// use deskship::process::ToolCommand;
/// use std::time::Duration;
///
/// # async fn example() -> deskship::core::Result<()> {
/// let output = ToolCommand::new("codesign")
///     .args(["--verify", "--deep", "--strict", "App.app"])
///     .with_timeout(Some(Duration::from_secs(60)))
///     .with_context("verify signature")
///     .execute()
///     .await?;
/// println!("{}", output.stderr);
/// # Ok(())
/// # }
/// ```
///
/// # Default Configuration
///
/// - **Timeout**: 10 minutes
/// - **Output capture**: stdout and stderr are always captured
/// - **Working directory**: inherited from the current process
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(OsString, OsString)>,
    timeout_duration: Option<Duration>,
    context: Option<String>,
    /// Arguments that must not appear in logs (passwords).
    redact: Vec<String>,
}

impl ToolCommand {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: Some(DEFAULT_TOOL_TIMEOUT),
            context: None,
            redact: Vec::new(),
        }
    }

    /// Add one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument that is replaced with `***` in log output.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        let arg = arg.into();
        self.redact.push(arg.clone());
        self.args.push(arg.into());
        self
    }

    /// Run in `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for the child process only.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set the timeout (`None` waits indefinitely).
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label included in log lines to tell concurrent operations apart.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Name of the tool for error messages (file name of the program).
    fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map_or_else(|| self.program.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned()
    }

    fn display_command(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if self.redact.iter().any(|secret| secret == arg.as_ref()) {
                parts.push("***".to_string());
            } else {
                parts.push(arg.into_owned());
            }
        }
        parts.join(" ")
    }

    /// Run the tool and return its output whatever the exit status.
    ///
    /// # Errors
    ///
    /// - [`DeskshipError::ToolNotFound`] when the program cannot be spawned
    /// - [`DeskshipError::ToolTimeout`] when the timeout elapses; the child is killed
    /// - [`DeskshipError::Io`] for other spawn failures
    pub async fn output(self) -> Result<ToolOutput> {
        let start = Instant::now();
        let tool = self.tool_name();
        let command_line = self.display_command();
        let ctx = self.context.clone().unwrap_or_else(|| tool.clone());

        tracing::debug!(target: "tool", "({}) Executing: {}", ctx, command_line);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let output_future = cmd.output();
        let result = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "tool",
                        "({}) Timed out after {} seconds: {}",
                        ctx,
                        duration.as_secs(),
                        command_line
                    );
                    return Err(DeskshipError::ToolTimeout {
                        tool,
                        seconds: duration.as_secs(),
                    });
                }
            },
            None => output_future.await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeskshipError::ToolNotFound {
                    tool: self.program.to_string_lossy().into_owned(),
                });
            }
            Err(e) => return Err(DeskshipError::Io(e)),
        };

        let output = ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "tool::perf",
                "({}) {} took {:.2}s",
                ctx,
                tool,
                elapsed.as_secs_f64()
            );
        }
        if !output.stdout.trim().is_empty() {
            tracing::trace!(target: "tool", "({}) stdout: {}", ctx, output.stdout.trim());
        }
        if !output.stderr.trim().is_empty() {
            tracing::trace!(target: "tool", "({}) stderr: {}", ctx, output.stderr.trim());
        }

        Ok(output)
    }

    /// Run the tool and require exit status 0.
    ///
    /// # Errors
    ///
    /// Everything [`output`](Self::output) returns, plus
    /// [`DeskshipError::ExternalTool`] carrying the captured output and exit
    /// code when the tool exits non-zero.
    pub async fn execute(self) -> Result<ToolOutput> {
        let tool = self.tool_name();
        let output = self.output().await?;

        if !output.success() {
            tracing::debug!(
                target: "tool",
                "{} failed with exit code {:?}: {}",
                tool,
                output.exit_code,
                output.stderr.trim()
            );
            return Err(DeskshipError::ExternalTool {
                tool,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}
