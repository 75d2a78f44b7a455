//! Conversion manager - drives a batch from planned jobs to written files.
//!
//! The manager owns the conflict resolver and circuit breaker for a session.
//! It reports through a [`ProgressHandle`] (polled) and an optional event
//! channel (pushed), and checks a cancel flag between files.

use crate::backend::{BackendRegistry, CircuitBreaker};
use crate::config::{FileType, FileTypeRegistry, Settings};
use crate::conflict::{
    ConflictPrompt, ConflictResolver, FileConflictInfo, Resolution, ResolutionAction,
};
use crate::error::{Error, ErrorReport};
use crate::progress::{ConflictStats, FileOutcome, ProgressHandle};
use crate::{ConvertOptions, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One source file and the Markdown path it should produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Maps sources to `<stem>.md` outputs.
///
/// Without `output_dir` each output sits next to its source. With it, the
/// layout below `input_root` is mirrored inside `output_dir`.
pub fn plan_jobs(
    files: &[PathBuf],
    input_root: Option<&Path>,
    output_dir: Option<&Path>,
) -> Vec<ConversionJob> {
    files
        .iter()
        .map(|source| {
            let file_name = source
                .file_stem()
                .map(|s| format!("{}.md", s.to_string_lossy()))
                .unwrap_or_else(|| "output.md".to_string());
            let output = match output_dir {
                Some(dir) => {
                    let relative_dir = input_root
                        .and_then(|root| source.strip_prefix(root).ok())
                        .and_then(Path::parent)
                        .unwrap_or(Path::new(""));
                    dir.join(relative_dir).join(file_name)
                }
                None => source.with_file_name(file_name),
            };
            ConversionJob {
                source: source.clone(),
                output,
            }
        })
        .collect()
}

/// Per-file result.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub source: PathBuf,
    /// Where Markdown was written; `None` if skipped or failed.
    pub output: Option<PathBuf>,
    pub outcome: FileOutcome,
    /// Backend that produced the output.
    pub backend: Option<String>,
    pub used_fallback: bool,
    pub backup: Option<PathBuf>,
    pub error: Option<ErrorReport>,
}

impl FileResult {
    fn skipped(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            output: None,
            outcome: FileOutcome::Skipped,
            backend: None,
            used_fallback: false,
            backup: None,
            error: None,
        }
    }

    fn failed(source: &Path, report: ErrorReport) -> Self {
        Self {
            source: source.to_path_buf(),
            output: None,
            outcome: FileOutcome::Failed,
            backend: None,
            used_fallback: false,
            backup: None,
            error: Some(report),
        }
    }
}

/// Totals for a finished (or cancelled) batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub results: Vec<FileResult>,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub conflicts: ConflictStats,
}

/// Pushed to the front end while a batch runs.
#[derive(Debug, Clone)]
pub enum ConversionEvent {
    Started { total: usize },
    FileStarted { index: usize, source: PathBuf },
    ConflictDetected(FileConflictInfo),
    FileFinished(FileResult),
    BackendDisabled { backend: String },
    Cancelled { completed: usize },
    Finished(BatchSummary),
}

struct FailedFile {
    error: Error,
    fallback_attempted: bool,
}

impl From<Error> for FailedFile {
    fn from(error: Error) -> Self {
        Self {
            error,
            fallback_attempted: false,
        }
    }
}

struct Converted {
    markdown: String,
    backend: String,
    used_fallback: bool,
}

/// Runs conversions for a session.
pub struct ConversionManager {
    backends: BackendRegistry,
    file_types: FileTypeRegistry,
    resolver: ConflictResolver,
    breaker: CircuitBreaker,
    options: ConvertOptions,
    enable_fallback: bool,
    cancel: Arc<AtomicBool>,
    progress: ProgressHandle,
    events: Option<Sender<ConversionEvent>>,
}

impl ConversionManager {
    pub fn new(settings: &Settings, file_types: FileTypeRegistry) -> Self {
        let conversion = settings.conversion();
        Self {
            backends: BackendRegistry::with_builtin(),
            file_types,
            resolver: ConflictResolver::new(settings.file_conflict()),
            breaker: CircuitBreaker::new(conversion.failure_threshold, conversion.breaker_cooldown),
            options: ConvertOptions {
                image_handling: conversion.image_handling,
                ..Default::default()
            },
            enable_fallback: conversion.enable_fallback,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: ProgressHandle::new(0),
            events: None,
        }
    }

    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    /// Installs the prompt used when the conflict policy is `ask`.
    pub fn with_prompt(mut self, prompt: Box<dyn ConflictPrompt>) -> Self {
        self.resolver = self.resolver.with_prompt(prompt);
        self
    }

    /// Starts sending [`ConversionEvent`]s; replaces any earlier subscriber.
    pub fn subscribe(&mut self) -> Receiver<ConversionEvent> {
        let (tx, rx) = mpsc::channel();
        self.events = Some(tx);
        rx
    }

    /// Setting the flag stops the current (or next) run before its next
    /// file. It is cleared when that run ends.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Progress of the current or most recent run.
    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Converts `jobs` on the calling thread.
    pub fn run(&mut self, jobs: Vec<ConversionJob>) -> BatchSummary {
        self.progress = ProgressHandle::new(jobs.len());
        self.execute(jobs)
    }

    /// Converts `jobs` on a worker thread.
    pub fn spawn(mut self, jobs: Vec<ConversionJob>) -> ConversionHandle {
        self.progress = ProgressHandle::new(jobs.len());
        let events = self.subscribe();
        let progress = self.progress();
        let cancel = self.cancel_flag();
        let worker = thread::spawn(move || self.execute(jobs));
        ConversionHandle {
            progress,
            cancel,
            events,
            worker,
        }
    }

    fn emit(&self, event: ConversionEvent) {
        if let Some(events) = &self.events {
            // A front end that stopped listening must not stop the batch.
            let _ = events.send(event);
        }
    }

    fn execute(&mut self, jobs: Vec<ConversionJob>) -> BatchSummary {
        let started = Instant::now();
        let total = jobs.len();
        tracing::info!(total, "conversion started");
        self.emit(ConversionEvent::Started { total });

        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;
        for (index, job) in jobs.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                cancelled = true;
                tracing::info!(completed = results.len(), "conversion cancelled");
                self.emit(ConversionEvent::Cancelled {
                    completed: results.len(),
                });
                break;
            }

            let name = job
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| job.source.display().to_string());
            self.progress.update(|p| p.start_file(name));
            self.emit(ConversionEvent::FileStarted {
                index,
                source: job.source.clone(),
            });

            let result = match self.process(job) {
                Ok(result) => result,
                Err(failed) => {
                    tracing::warn!(
                        source = %job.source.display(),
                        "conversion failed: {}",
                        failed.error
                    );
                    FileResult::failed(
                        &job.source,
                        ErrorReport::new(&failed.error, failed.fallback_attempted),
                    )
                }
            };
            self.progress.update(|p| p.complete_file(result.outcome));
            self.emit(ConversionEvent::FileFinished(result.clone()));
            results.push(result);
        }

        let count = |outcome: FileOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        let summary = BatchSummary {
            converted: count(FileOutcome::Converted),
            skipped: count(FileOutcome::Skipped),
            failed: count(FileOutcome::Failed),
            cancelled,
            elapsed: started.elapsed(),
            conflicts: self.progress.update(|p| p.conflicts()),
            results,
        };
        tracing::info!(
            converted = summary.converted,
            skipped = summary.skipped,
            failed = summary.failed,
            "conversion finished"
        );
        // A cancellation only applies to the run it interrupted.
        self.cancel.store(false, Ordering::Relaxed);
        self.emit(ConversionEvent::Finished(summary.clone()));
        summary
    }

    fn process(&mut self, job: &ConversionJob) -> std::result::Result<FileResult, FailedFile> {
        let file_type = self
            .file_types
            .for_path(&job.source)
            .cloned()
            .ok_or_else(|| Error::BackendUnavailable(job.source.display().to_string()))?;

        if same_file(&job.source, &job.output) {
            tracing::debug!(source = %job.source.display(), "skipped, source is its own output");
            return Ok(FileResult::skipped(&job.source));
        }

        let mut output = job.output.clone();
        let mut pending: Option<Resolution> = None;
        let mut info = self.resolver.detect_conflict(&job.source, &job.output);
        if info.has_conflict() {
            self.progress.update(|p| p.record_conflict_detected());
            self.emit(ConversionEvent::ConflictDetected(info.clone()));

            let policy = self.resolver.effective_policy();
            let resolution = self.resolver.resolve(&mut info, policy)?;
            self.progress
                .update(|p| p.record_conflict_resolution(resolution.action));
            if resolution.action == ResolutionAction::Skip {
                tracing::debug!(source = %job.source.display(), "skipped, output exists");
                return Ok(FileResult::skipped(&job.source));
            }
            if let Some(path) = &resolution.output_path {
                output = path.clone();
            }
            pending = Some(resolution);
        }
        self.progress.update(|p| p.set_file_progress(0.1));

        let converted = self.convert_with_fallback(&job.source, &file_type)?;
        self.progress.update(|p| p.set_file_progress(0.8));

        let backup = match &pending {
            Some(resolution) => self.resolver.backup_existing(resolution)?,
            None => None,
        };
        write_output(&output, &converted.markdown)?;
        self.progress.update(|p| p.set_file_progress(1.0));
        tracing::debug!(
            source = %job.source.display(),
            output = %output.display(),
            backend = %converted.backend,
            "converted"
        );

        Ok(FileResult {
            source: job.source.clone(),
            output: Some(output),
            outcome: FileOutcome::Converted,
            backend: Some(converted.backend),
            used_fallback: converted.used_fallback,
            backup,
            error: None,
        })
    }

    fn convert_with_fallback(
        &mut self,
        source: &Path,
        file_type: &FileType,
    ) -> std::result::Result<Converted, FailedFile> {
        let primary = file_type.backend.as_str();
        let error = if self.breaker.is_open(primary) {
            Error::BackendUnavailable(format!("{primary} is temporarily disabled"))
        } else {
            match self.backends.convert(primary, source, &self.options) {
                Ok(markdown) => {
                    self.breaker.record_success(primary);
                    return Ok(Converted {
                        markdown,
                        backend: primary.to_string(),
                        used_fallback: false,
                    });
                }
                Err(e) => {
                    tracing::warn!(source = %source.display(), backend = primary, "backend failed: {e}");
                    if self.breaker.record_failure(primary) {
                        self.emit(ConversionEvent::BackendDisabled {
                            backend: primary.to_string(),
                        });
                    }
                    e
                }
            }
        };

        let fallback = file_type
            .fallback
            .as_deref()
            .filter(|_| self.enable_fallback);
        let Some(fallback) = fallback else {
            return Err(FailedFile {
                error,
                fallback_attempted: false,
            });
        };

        match self.backends.convert(fallback, source, &self.options) {
            Ok(markdown) => {
                tracing::info!(source = %source.display(), backend = fallback, "used fallback backend");
                Ok(Converted {
                    markdown,
                    backend: fallback.to_string(),
                    used_fallback: true,
                })
            }
            Err(fallback_error) => {
                tracing::warn!(
                    source = %source.display(),
                    backend = fallback,
                    "fallback failed too: {fallback_error}"
                );
                Err(FailedFile {
                    error,
                    fallback_attempted: true,
                })
            }
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn write_output(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, markdown)?;
    Ok(())
}

/// A batch running on a worker thread.
pub struct ConversionHandle {
    progress: ProgressHandle,
    cancel: Arc<AtomicBool>,
    events: Receiver<ConversionEvent>,
    worker: JoinHandle<BatchSummary>,
}

impl ConversionHandle {
    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    pub fn events(&self) -> &Receiver<ConversionEvent> {
        &self.events
    }

    /// Asks the worker to stop before the next file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<BatchSummary> {
        self.worker
            .join()
            .map_err(|_| Error::Conversion("conversion worker panicked".to_string()))
    }
}
