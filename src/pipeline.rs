use crate::{
    client::{is_supported_image, AnalysisOutcome, AnalysisRequest, PerfMetrics, VisionClient},
    config::{Config, Validation},
    postprocess::normalize_response,
    progress::ProgressSnapshot,
    report::{BatchItemResult, BatchSummary, FailureKind, ItemStatus, SummaryBuilder},
    validate::{validate, Verdict},
    writer::{
        OutputFormats, OverwritePolicy, ResultWriter, WriteDetails, WriteOutcome, WriteReport,
    },
};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One automatic retry: the whole analyze/validate/write sequence runs at
/// most twice per item.
pub const MAX_ATTEMPTS: u32 = 2;

/// Everything a batch needs, fixed for the duration of the run.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub host: String,
    pub model: String,
    pub timeout: Duration,
    pub prompt: String,
    pub output_dir: Option<PathBuf>,
    pub formats: OutputFormats,
    pub policy: OverwritePolicy,
    pub validation: Validation,
}

impl BatchSettings {
    pub fn from_config(cfg: &Config, prompt: String, formats: OutputFormats) -> Self {
        let output_dir = if cfg.output.dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(&cfg.output.dir))
        };
        Self {
            host: cfg.server.host.clone(),
            model: cfg.server.model.clone(),
            timeout: cfg.server.timeout(),
            prompt,
            output_dir,
            formats,
            policy: OverwritePolicy::from_overwrite(cfg.output.overwrite),
            validation: cfg.validation.clone(),
        }
    }
}

/// Shared between the worker and whoever watches it: a cancel flag and a
/// completed-items readout.
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after the in-flight item finishes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    ItemStarted {
        index: usize,
        total: usize,
        image: PathBuf,
    },
    Retrying {
        image: PathBuf,
        reason: String,
    },
    ItemFinished {
        result: BatchItemResult,
        progress: ProgressSnapshot,
    },
    Finished {
        cancelled: bool,
    },
}

pub struct Pipeline<C: VisionClient> {
    settings: BatchSettings,
    client: C,
    writer: ResultWriter,
}

struct Failure {
    kind: FailureKind,
    reason: String,
}

enum Attempt {
    Saved {
        report: WriteReport,
        metrics: PerfMetrics,
    },
    Skipped {
        existing: PathBuf,
    },
}

impl<C: VisionClient> Pipeline<C> {
    pub fn new(settings: BatchSettings, client: C) -> Self {
        let writer = ResultWriter::new(
            settings.output_dir.clone(),
            settings.formats,
            settings.policy,
        );
        Self {
            settings,
            client,
            writer,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Process `images` in order on the calling thread.
    pub fn run(
        &self,
        images: &[PathBuf],
        control: &BatchControl,
        events: Option<&Sender<BatchEvent>>,
    ) -> BatchSummary {
        let total = images.len();
        let mut summary = SummaryBuilder::new(total);
        let mut cancelled = false;

        emit(events, BatchEvent::Started { total });
        info!("starting batch of {total} images");

        for (index, image) in images.iter().enumerate() {
            if control.is_cancelled() {
                info!(
                    "batch stopped by request after {} of {total} images",
                    summary.completed()
                );
                cancelled = true;
                break;
            }

            emit(
                events,
                BatchEvent::ItemStarted {
                    index,
                    total,
                    image: image.clone(),
                },
            );
            info!("[{}/{total}] {}", index + 1, image.display());

            let result = self.process(image, events);
            summary.push(result.clone());
            control.completed.store(summary.completed(), Ordering::SeqCst);

            let progress = ProgressSnapshot::compute(summary.completed(), total, summary.elapsed());
            debug!("{}", progress.status_line());
            emit(events, BatchEvent::ItemFinished { result, progress });
        }

        let summary = summary.finish(cancelled);
        info!(
            "batch {}: {} saved, {} skipped, {} failed",
            if cancelled { "stopped" } else { "complete" },
            summary.counts.saved + summary.counts.retried_saved,
            summary.counts.skipped,
            summary.counts.failed
        );
        emit(events, BatchEvent::Finished { cancelled });
        summary
    }

    /// Manual retry pass over the items that failed in `previous`.
    pub fn retry_failed(
        &self,
        previous: &BatchSummary,
        control: &BatchControl,
        events: Option<&Sender<BatchEvent>>,
    ) -> BatchSummary {
        let candidates = previous.retry_candidates();
        info!("retrying {} failed items", candidates.len());
        self.run(&candidates, control, events)
    }

    fn process(&self, image: &Path, events: Option<&Sender<BatchEvent>>) -> BatchItemResult {
        let started = Instant::now();
        let finish = |status, attempts, report: WriteReport, metrics| BatchItemResult {
            image: image.to_path_buf(),
            status,
            artifacts: report.artifacts,
            notes: report.notes,
            elapsed: started.elapsed(),
            attempts,
            metrics,
        };

        if let Err(reason) = preflight(image) {
            warn!("{reason}");
            let status = ItemStatus::Failed {
                kind: FailureKind::Input,
                reason,
            };
            return finish(status, 0, WriteReport::default(), None);
        }

        if self.writer.policy() == OverwritePolicy::Protect {
            if let Some(existing) = self.writer.targets(image).existing() {
                info!("skipping {}: {} already exists", image.display(), existing.display());
                let status = ItemStatus::Skipped {
                    existing: existing.clone(),
                };
                return finish(status, 0, WriteReport::default(), None);
            }
        }

        let mut attempts = 0;
        let mut last = None;
        while attempts < MAX_ATTEMPTS {
            attempts += 1;
            match self.attempt(image) {
                Ok(Attempt::Saved { report, metrics }) => {
                    let status = if attempts == 1 {
                        ItemStatus::Saved
                    } else {
                        info!("retry succeeded for {}", image.display());
                        ItemStatus::RetriedSaved
                    };
                    let metrics = (!metrics.is_empty()).then_some(metrics);
                    return finish(status, attempts, report, metrics);
                }
                Ok(Attempt::Skipped { existing }) => {
                    let status = ItemStatus::Skipped { existing };
                    return finish(status, attempts, WriteReport::default(), None);
                }
                Err(failure) => {
                    if attempts < MAX_ATTEMPTS {
                        warn!(
                            "{} failed ({}): {}; retrying",
                            image.display(),
                            failure.kind,
                            failure.reason
                        );
                        emit(
                            events,
                            BatchEvent::Retrying {
                                image: image.to_path_buf(),
                                reason: failure.reason.clone(),
                            },
                        );
                    } else {
                        error!(
                            "{} failed again ({}): {}",
                            image.display(),
                            failure.kind,
                            failure.reason
                        );
                    }
                    last = Some(failure);
                }
            }
        }

        let failure = last.unwrap_or(Failure {
            kind: FailureKind::Network,
            reason: "no attempt was made".to_string(),
        });
        let status = ItemStatus::RetriedFailed {
            kind: failure.kind,
            reason: failure.reason,
        };
        finish(status, attempts, WriteReport::default(), None)
    }

    /// One full pass: request, normalize, validate, write.
    fn attempt(&self, image: &Path) -> Result<Attempt, Failure> {
        let s = &self.settings;
        let req = AnalysisRequest::new(image, &s.prompt, &s.model, &s.host, s.timeout);

        let call_started = Instant::now();
        let (raw, metrics) = match self.client.analyze(&req) {
            AnalysisOutcome::Success { text, metrics } => (text, metrics),
            AnalysisOutcome::Failure { reason } => {
                return Err(Failure {
                    kind: FailureKind::Network,
                    reason,
                });
            }
        };
        let call_elapsed = call_started.elapsed();

        let text = normalize_response(&raw);
        if let Verdict::Rejected { reason, detail } = validate(&s.validation, &text) {
            return Err(Failure {
                kind: FailureKind::Validation,
                reason: format!("response rejected, {reason}: {detail}"),
            });
        }

        let details = WriteDetails {
            model: s.model.clone(),
            processing_seconds: metrics
                .total_seconds()
                .or(Some(call_elapsed.as_secs_f64())),
        };
        match self.writer.write(image, &text, &details) {
            Ok(WriteOutcome::Written(report)) => Ok(Attempt::Saved { report, metrics }),
            Ok(WriteOutcome::Skipped { existing }) => Ok(Attempt::Skipped { existing }),
            Err(e) => Err(Failure {
                kind: FailureKind::Write,
                reason: e.to_string(),
            }),
        }
    }
}

impl<C: VisionClient + Send + Sync + 'static> Pipeline<C> {
    /// Run the batch on a single background thread. `control` may be shared
    /// with a signal handler so one Ctrl-C stops every pass.
    pub fn spawn(pipeline: Arc<Self>, images: Vec<PathBuf>, control: BatchControl) -> BatchHandle {
        let (tx, rx) = mpsc::channel();
        let worker_control = control.clone();
        let thread = std::thread::spawn(move || pipeline.run(&images, &worker_control, Some(&tx)));
        BatchHandle {
            control,
            events: rx,
            thread,
        }
    }
}

pub struct BatchHandle {
    control: BatchControl,
    events: Receiver<BatchEvent>,
    thread: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn completed(&self) -> usize {
        self.control.completed()
    }

    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    pub fn join(self) -> Result<BatchSummary> {
        self.thread
            .join()
            .map_err(|_| anyhow!("batch worker thread panicked"))
    }
}

fn preflight(image: &Path) -> std::result::Result<(), String> {
    if !image.is_file() {
        return Err(format!("image file not found: {}", image.display()));
    }
    if !is_supported_image(image) {
        return Err(format!("unsupported image format: {}", image.display()));
    }
    Ok(())
}

fn emit(events: Option<&Sender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = events {
        // Receiver may be gone; the batch keeps going regardless.
        let _ = tx.send(event);
    }
}
