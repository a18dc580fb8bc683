//! Progress indication for build graph execution.
//!
//! A single spinner shows which tasks are running. Spinners are hidden when the
//! `FWBUNDLE_NO_PROGRESS` environment variable is set. `--no-progress` makes the
//! scheduler use [`TaskProgress::hidden`] instead.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

use crate::constants::NO_PROGRESS_ENV;

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

/// Spinner tracking `done/total` tasks with the currently running task ids.
#[derive(Clone)]
pub struct TaskProgress {
    inner: IndicatifBar,
}

impl TaskProgress {
    /// Creates a spinner for a graph of `total` tasks.
    pub fn new(total: u64) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(total);
            bar.set_style(
                IndicatifStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}")
                    .unwrap_or_else(|_| IndicatifStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self {
            inner: bar,
        }
    }

    /// Creates a spinner that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Shows the currently running task ids.
    pub fn set_running(&self, running: &[String]) {
        if running.is_empty() {
            self.inner.set_message(String::new());
        } else {
            self.inner.set_message(format!("running {}", running.join(", ")));
        }
    }

    /// Marks one more task as finished.
    pub fn inc(&self) {
        self.inner.inc(1);
    }

    /// Clears the spinner from the terminal.
    pub fn finish(&self) {
        self.inner.finish_and_clear();
    }
}
