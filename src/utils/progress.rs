//! Progress indicators for long-running operations.
//!
//! Thin wrapper over `indicatif` with deskship styling. Indicators are hidden
//! when the `DESKSHIP_NO_PROGRESS` environment variable is set or when
//! [`disable_progress`] has been called (the `--no-progress` flag), which keeps
//! output clean in CI logs and when tests capture stdout.
//!
//! # Examples
//!
//! ```rust
//! use deskship::utils::progress::ProgressBar;
//!
//! let uploads = ProgressBar::new(3);
//! uploads.set_message("Uploading release files");
//! for _ in 0..3 {
//!     uploads.inc(1);
//! }
//! uploads.finish_with_message("✅ Uploaded 3 files");
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Environment variable that hides all progress indicators.
pub const NO_PROGRESS_ENV: &str = "DESKSHIP_NO_PROGRESS";

static DISABLED: AtomicBool = AtomicBool::new(false);

/// Hide every progress indicator created from now on.
pub fn disable_progress() {
    DISABLED.store(true, Ordering::Relaxed);
}

fn is_progress_disabled() -> bool {
    DISABLED.load(Ordering::Relaxed) || std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A progress bar or spinner with consistent styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Bar counting `len` units of work (files, platforms).
    #[must_use]
    pub fn new(len: u64) -> Self {
        Self::styled(|| IndicatifBar::new(len), count_style())
    }

    /// Byte bar for a download; `len` is the announced size if known.
    #[must_use]
    pub fn new_bytes(len: Option<u64>) -> Self {
        match len {
            Some(len) => Self::styled(|| IndicatifBar::new(len), bytes_style()),
            None => Self::new_spinner(),
        }
    }

    /// Spinner for work of unknown length (stage status).
    #[must_use]
    pub fn new_spinner() -> Self {
        let bar = Self::styled(IndicatifBar::new_spinner, spinner_style());
        bar.inner.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn styled(make: impl FnOnce() -> IndicatifBar, style: ProgressStyle) -> Self {
        let inner = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = make();
            bar.set_style(style);
            bar
        };
        Self {
            inner,
        }
    }

    /// Replace the message.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Advance by `delta`.
    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    /// Jump to `pos`.
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Finish and leave `msg` on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Finish and remove the indicator.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    /// Whether output is suppressed.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }
}

fn count_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
}
