//! Progress tracking for a batch conversion.
//!
//! The worker updates a [`ConversionProgress`] behind a [`ProgressHandle`];
//! front ends poll [`ProgressHandle::snapshot`] on a timer.

use crate::conflict::ResolutionAction;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How a single file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Converted,
    Skipped,
    Failed,
}

/// Conflict counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConflictStats {
    pub detected: usize,
    pub skipped: usize,
    pub overwritten: usize,
    pub renamed: usize,
}

/// Counters for one conversion run. Recreated for every run.
#[derive(Debug, Clone)]
pub struct ConversionProgress {
    total_files: usize,
    completed_files: usize,
    failed_files: usize,
    skipped_files: usize,
    current_file: Option<String>,
    current_file_progress: f64,
    conflicts: ConflictStats,
    started_at: Instant,
}

impl ConversionProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            completed_files: 0,
            failed_files: 0,
            skipped_files: 0,
            current_file: None,
            current_file_progress: 0.0,
            conflicts: ConflictStats::default(),
            started_at: Instant::now(),
        }
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    /// Files finished in any way (converted, skipped or failed).
    pub fn completed_files(&self) -> usize {
        self.completed_files
    }

    pub fn failed_files(&self) -> usize {
        self.failed_files
    }

    pub fn skipped_files(&self) -> usize {
        self.skipped_files
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn conflicts(&self) -> ConflictStats {
        self.conflicts
    }

    pub fn is_finished(&self) -> bool {
        self.completed_files >= self.total_files
    }

    pub fn start_file(&mut self, name: impl Into<String>) {
        self.current_file = Some(name.into());
        self.current_file_progress = 0.0;
    }

    /// Sets progress within the current file. Values are clamped to
    /// `0.0..=1.0` and never move backwards.
    pub fn set_file_progress(&mut self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        if fraction > self.current_file_progress {
            self.current_file_progress = fraction;
        }
    }

    /// Records the end of the current file. Completions beyond
    /// `total_files` are ignored.
    pub fn complete_file(&mut self, outcome: FileOutcome) -> bool {
        if self.completed_files >= self.total_files {
            tracing::warn!(
                total = self.total_files,
                "ignoring completion past the end of the batch"
            );
            return false;
        }
        self.completed_files += 1;
        match outcome {
            FileOutcome::Converted => {}
            FileOutcome::Skipped => self.skipped_files += 1,
            FileOutcome::Failed => self.failed_files += 1,
        }
        self.current_file = None;
        self.current_file_progress = 0.0;
        true
    }

    pub fn record_conflict_detected(&mut self) {
        self.conflicts.detected += 1;
    }

    pub fn record_conflict_resolution(&mut self, action: ResolutionAction) {
        match action {
            ResolutionAction::Skip => self.conflicts.skipped += 1,
            ResolutionAction::Overwrite => self.conflicts.overwritten += 1,
            ResolutionAction::Rename => self.conflicts.renamed += 1,
        }
    }

    /// `(completed + current_file_progress) / total * 100`, clamped to `0..=100`.
    ///
    /// An empty batch counts as done.
    pub fn percent(&self) -> f64 {
        if self.total_files == 0 || self.completed_files >= self.total_files {
            return 100.0;
        }
        let done = self.completed_files as f64 + self.current_file_progress;
        (done / self.total_files as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Linear extrapolation from the elapsed time. `None` until some
    /// progress has been made, or while the estimate is too large to represent.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let fraction = self.percent() / 100.0;
        if fraction <= 0.0 {
            return None;
        }
        if fraction >= 1.0 {
            return Some(Duration::ZERO);
        }
        let elapsed = self.elapsed().as_secs_f64();
        Duration::try_from_secs_f64(elapsed * (1.0 - fraction) / fraction).ok()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_files: self.total_files,
            completed_files: self.completed_files,
            failed_files: self.failed_files,
            skipped_files: self.skipped_files,
            current_file: self.current_file.clone(),
            percent: self.percent(),
            elapsed_secs: self.elapsed().as_secs_f64(),
            remaining_secs: self.estimated_remaining().map(|d| d.as_secs_f64()),
            conflicts: self.conflicts,
        }
    }
}

/// Point-in-time copy of the progress, safe to hand to a UI thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub current_file: Option<String>,
    pub percent: f64,
    pub elapsed_secs: f64,
    pub remaining_secs: Option<f64>,
    pub conflicts: ConflictStats,
}

/// Shared handle between the worker and the front end.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Arc<Mutex<ConversionProgress>>,
}

impl ProgressHandle {
    pub fn new(total_files: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConversionProgress::new(total_files))),
        }
    }

    /// Runs `f` with the progress locked.
    pub fn update<R>(&self, f: impl FnOnce(&mut ConversionProgress) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    // A panic while holding the lock leaves plain counters behind, still readable.
    fn lock(&self) -> MutexGuard<'_, ConversionProgress> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
