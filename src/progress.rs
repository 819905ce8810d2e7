//! Progress reporting.
//!
//! The pipeline emits `ProgressEvent`s to a `ProgressSink`. The CLI renders
//! them with an `indicatif` spinner; library callers and tests can use
//! `NoProgress` or their own sink.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Catalog,
    Planning,
    Sampling,
    Closure,
    Verification,
    Sequences,
    Writing,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Catalog => "Reading catalog",
            Phase::Planning => "Planning",
            Phase::Sampling => "Sampling",
            Phase::Closure => "Resolving foreign keys",
            Phase::Verification => "Verifying",
            Phase::Sequences => "Reconciling sequences",
            Phase::Writing => "Writing script",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase(Phase),
    /// A table is being processed
    Table {
        name: String,
        completed: usize,
        total: usize,
    },
    /// One pass over every followed foreign key finished
    ClosureIteration { iteration: usize, rows_added: u64 },
    Finished,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards every event
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

/// Spinner on stderr
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Default for SpinnerProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for SpinnerProgress {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase(phase) => self.bar.set_message(format!("{}...", phase.label())),
            ProgressEvent::Table {
                name,
                completed,
                total,
            } => self
                .bar
                .set_message(format!("Sampling {} ({}/{})", name, completed, total)),
            ProgressEvent::ClosureIteration {
                iteration,
                rows_added,
            } => self.bar.set_message(format!(
                "Resolving foreign keys: pass {} added {} rows",
                iteration, rows_added
            )),
            ProgressEvent::Finished => self.bar.finish_and_clear(),
        }
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
