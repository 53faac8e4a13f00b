//! Terminal spinner for long-running update steps.
//!
//! The spinner is hidden when `NVMW_NO_PROGRESS` is set or `--no-progress` was
//! passed, which keeps CI logs and piped output clean.

use crate::constants::NO_PROGRESS_ENV;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

/// Thin wrapper over an indicatif spinner.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// A ticking spinner, or a hidden one if progress output is disabled.
    pub fn new_spinner() -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }

        let inner = IndicatifBar::new_spinner();
        inner.set_style(spinner_style());
        inner.enable_steady_tick(Duration::from_millis(100));
        Self {
            inner,
        }
    }

    /// A spinner that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Run `f` with the spinner cleared, so output it prints is not torn.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.inner.suspend(f)
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
