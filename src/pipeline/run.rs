//! Run state shared between the orchestrator and the presentation layer.
//!
//! A [`PipelineRun`] is the orchestrator's private, writable view of one run.
//! A [`RunMonitor`] is the cloneable read side plus the cancellation switch:
//! the CLI polls it for status text and flips cancellation from a Ctrl-C
//! handler. There is exactly one writer, so readers only ever see a slightly
//! stale snapshot.

use super::stage::{Stage, StageOutcome};
use crate::constants::STATUS_ERROR_MARKER;
use crate::core::{DeskshipError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct RunState {
    current_stage: Option<Stage>,
    status: String,
}

#[derive(Debug, Default)]
struct Shared {
    processing: AtomicBool,
    cancel_requested: AtomicBool,
    state: Mutex<RunState>,
}

/// Read-only view of the active run plus the cancellation switch.
#[derive(Debug, Clone, Default)]
pub struct RunMonitor {
    shared: Arc<Shared>,
}

impl RunMonitor {
    /// Monitor with no run in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        // A poisoned lock only means a writer panicked mid-update; the text is still usable.
        self.shared.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Latest status line. Failures start with [`STATUS_ERROR_MARKER`].
    #[must_use]
    pub fn status(&self) -> String {
        self.state().status.clone()
    }

    /// Whether the current status reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.state().status.starts_with(STATUS_ERROR_MARKER)
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.shared.processing.load(Ordering::Acquire)
    }

    /// Stage the active run is in.
    #[must_use]
    pub fn current_stage(&self) -> Option<Stage> {
        self.state().current_stage
    }

    /// Ask the active run to stop at its next check.
    pub fn request_cancel(&self) {
        if self.is_processing() {
            tracing::info!("Cancellation requested");
        }
        self.shared.cancel_requested.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::Acquire)
    }

    /// Claim the processing flag for a new run.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::AlreadyRunning`] if a run is in flight.
    pub(crate) fn begin(&self) -> Result<PipelineRun> {
        if self
            .shared
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DeskshipError::AlreadyRunning);
        }

        self.shared.cancel_requested.store(false, Ordering::Release);
        {
            let mut state = self.state();
            state.current_stage = None;
            state.status = "Starting".to_string();
        }

        Ok(PipelineRun {
            monitor: self.clone(),
            stages: Vec::new(),
            version: None,
            warnings: Vec::new(),
        })
    }
}

/// Mutable state of the run in flight, owned by the orchestrator.
///
/// Dropping it releases the processing flag, so an early return or panic
/// cannot leave the monitor stuck in the processing state.
#[derive(Debug)]
pub struct PipelineRun {
    monitor: RunMonitor,
    stages: Vec<(Stage, StageOutcome)>,
    version: Option<String>,
    warnings: Vec<String>,
}

impl PipelineRun {
    /// Enter `stage` and publish a status line for it.
    pub fn enter(&mut self, stage: Stage, status: impl Into<String>) {
        let status = status.into();
        tracing::info!("[{}] {}", stage, status);
        let mut state = self.monitor.state();
        state.current_stage = Some(stage);
        state.status = status;
    }

    /// Publish a progress status line.
    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        tracing::debug!("{}", status);
        self.monitor.state().status = status;
    }

    /// Publish a failure status line, prefixed with the error marker.
    pub fn set_error(&self, message: &str) {
        self.monitor.state().status = format!("{STATUS_ERROR_MARKER}{message}");
    }

    /// Record the outcome of `stage`.
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.stages.push((stage, outcome));
    }

    /// Record a non-fatal problem reported in the outcome.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Record the version being released.
    pub fn set_version(&mut self, version: &str) {
        self.version = Some(version.to_string());
    }

    /// Fail with [`DeskshipError::Cancelled`] if cancellation was requested.
    ///
    /// Called between stages and before each unit of work inside a stage.
    pub fn checkpoint(&self) -> Result<()> {
        if self.monitor.is_cancel_requested() {
            Err(DeskshipError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Close the run and build its outcome.
    pub(crate) fn finish(
        mut self,
        result: Result<()>,
        release_dir: Option<PathBuf>,
        release_url: Option<String>,
    ) -> RunOutcome {
        let (status, message) = match result {
            Ok(()) => {
                let message = match &self.version {
                    Some(version) => format!("✅ Release {version} completed"),
                    None => "✅ Completed".to_string(),
                };
                self.set_status(message.clone());
                (RunStatus::Succeeded, message)
            }
            Err(DeskshipError::Cancelled) => {
                let message = "Cancelled".to_string();
                self.set_status(message.clone());
                (RunStatus::Cancelled, message)
            }
            Err(error) => {
                let message = error.to_string();
                if let Some(stage) = self.monitor.current_stage() {
                    let already_recorded = self.stages.iter().any(|(s, _)| *s == stage);
                    if !already_recorded {
                        self.record(stage, StageOutcome::Failed(message.clone()));
                    }
                }
                self.set_error(&message);
                tracing::error!("{}", message);
                if let Some(output) = error.captured_output() {
                    tracing::error!("Tool output:\n{}", output.trim());
                }
                (RunStatus::Failed, message)
            }
        };

        RunOutcome {
            status,
            message,
            version: self.version.take(),
            stages: std::mem::take(&mut self.stages),
            warnings: std::mem::take(&mut self.warnings),
            release_dir,
            release_url,
        }
    }
}

impl Drop for PipelineRun {
    fn drop(&mut self) {
        self.monitor.state().current_stage = None;
        self.monitor.shared.processing.store(false, Ordering::Release);
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Every enabled stage completed.
    Succeeded,
    /// A stage failed; later stages did not run.
    Failed,
    /// Cancellation was observed; later stages did not run.
    Cancelled,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// How the run ended.
    pub status: RunStatus,
    /// Final status line (without the error marker).
    pub message: String,
    /// Version that was assigned, if the run got that far.
    pub version: Option<String>,
    /// Outcome of each stage that was reached, in order.
    pub stages: Vec<(Stage, StageOutcome)>,
    /// Non-fatal problems (for example a failed notarization).
    pub warnings: Vec<String>,
    /// `Releases/v{version}` folder, if packaging was reached.
    pub release_dir: Option<PathBuf>,
    /// Release page URL, if published.
    pub release_url: Option<String>,
}

impl RunOutcome {
    /// Outcome of a run that never started.
    pub(crate) fn rejected(error: &DeskshipError) -> Self {
        Self {
            status: RunStatus::Failed,
            message: error.to_string(),
            version: None,
            stages: Vec::new(),
            warnings: Vec::new(),
            release_dir: None,
            release_url: None,
        }
    }

    /// Whether the run succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Outcome recorded for `stage`, if it was reached.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, outcome)| outcome)
    }
}
