use crate::{client::PerfMetrics, util::now_rfc3339, writer::Artifact};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Missing or unsupported image, caught before any request.
    Input,
    Network,
    Validation,
    Write,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Input => "input",
            FailureKind::Network => "network",
            FailureKind::Validation => "validation",
            FailureKind::Write => "write",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemStatus {
    Saved,
    Skipped { existing: PathBuf },
    Failed { kind: FailureKind, reason: String },
    RetriedSaved,
    RetriedFailed { kind: FailureKind, reason: String },
}

impl ItemStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, ItemStatus::Saved | ItemStatus::RetriedSaved)
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            ItemStatus::Failed { .. } | ItemStatus::RetriedFailed { .. }
        )
    }

    pub fn failure(&self) -> Option<(FailureKind, &str)> {
        match self {
            ItemStatus::Failed { kind, reason } | ItemStatus::RetriedFailed { kind, reason } => {
                Some((*kind, reason.as_str()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub image: PathBuf,
    pub status: ItemStatus,
    pub artifacts: Vec<Artifact>,
    /// Partial-success notes, e.g. a YAML sidecar that could not be written.
    pub notes: Vec<String>,
    pub elapsed: Duration,
    /// Server calls made for this item.
    pub attempts: u32,
    pub metrics: Option<PerfMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub saved: usize,
    pub retried_saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub items_with_metrics: usize,
    pub tokens_per_second: Option<f64>,
    pub total_seconds: Option<f64>,
    pub response_tokens: Option<f64>,
    pub prompt_tokens: Option<f64>,
}

impl Averages {
    pub fn from_metrics<'a>(metrics: impl Iterator<Item = &'a PerfMetrics>) -> Self {
        let mut n = 0usize;
        let mut eval_tokens = 0u64;
        let mut eval_ns = 0u64;
        let mut prompt_tokens = 0u64;
        let mut total_ns = 0u64;

        for m in metrics.filter(|m| m.eval_count.is_some()) {
            n += 1;
            eval_tokens += m.eval_count.unwrap_or(0);
            eval_ns += m.eval_duration_ns.unwrap_or(0);
            prompt_tokens += m.prompt_eval_count.unwrap_or(0);
            total_ns += m.total_duration_ns.unwrap_or(0);
        }

        if n == 0 {
            return Self::default();
        }
        let per_item = |v: u64| Some(v as f64 / n as f64);
        Self {
            items_with_metrics: n,
            tokens_per_second: (eval_ns > 0).then(|| eval_tokens as f64 / (eval_ns as f64 / 1e9)),
            total_seconds: (total_ns > 0).then(|| total_ns as f64 / 1e9 / n as f64),
            response_tokens: per_item(eval_tokens),
            prompt_tokens: if prompt_tokens > 0 { per_item(prompt_tokens) } else { None },
        }
    }
}

/// Final, read-only result of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub items: Vec<BatchItemResult>,
    pub total: usize,
    pub cancelled: bool,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed: Duration,
    pub counts: Counts,
    pub averages: Averages,
}

impl BatchSummary {
    /// Images that ended failed, in batch order; input for the manual retry pass.
    pub fn retry_candidates(&self) -> Vec<PathBuf> {
        self.items
            .iter()
            .filter(|i| i.status.is_failed())
            .map(|i| i.image.clone())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    pub fn item(&self, image: &Path) -> Option<&BatchItemResult> {
        self.items.iter().find(|i| i.image == image)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let headline = if self.cancelled {
            "Batch stopped"
        } else {
            "Batch complete"
        };
        let _ = writeln!(
            out,
            "{headline}: {} of {} images processed in {:.1}s",
            self.items.len(),
            self.total,
            self.elapsed.as_secs_f64()
        );
        let c = self.counts;
        let _ = writeln!(
            out,
            "  saved: {} ({} after retry)  skipped: {}  failed: {}",
            c.saved + c.retried_saved,
            c.retried_saved,
            c.skipped,
            c.failed
        );

        out.push_str(&self.render_failures());

        let noted: Vec<&BatchItemResult> =
            self.items.iter().filter(|i| !i.notes.is_empty()).collect();
        if !noted.is_empty() {
            let _ = writeln!(out, "Notes:");
            for item in noted {
                for note in &item.notes {
                    let _ = writeln!(out, "  - {}: {note}", display_name(&item.image));
                }
            }
        }

        let a = self.averages;
        if a.items_with_metrics > 0 {
            let fmt_opt = |v: Option<f64>, unit: &str| match v {
                Some(v) => format!("{v:.2}{unit}"),
                None => "-".to_string(),
            };
            let _ = writeln!(
                out,
                "Averages over {} items: {}, {} per image, {} response tokens, {} prompt tokens",
                a.items_with_metrics,
                fmt_opt(a.tokens_per_second, " tok/s"),
                fmt_opt(a.total_seconds, "s"),
                fmt_opt(a.response_tokens, ""),
                fmt_opt(a.prompt_tokens, ""),
            );
        }
        out
    }
}

impl BatchSummary {
    /// Only the failed-items section; empty when nothing failed.
    pub fn render_failures(&self) -> String {
        let mut out = String::new();
        let failed: Vec<&BatchItemResult> =
            self.items.iter().filter(|i| i.status.is_failed()).collect();
        if !failed.is_empty() {
            let _ = writeln!(out, "Failed items:");
            for item in failed {
                if let Some((kind, reason)) = item.status.failure() {
                    let _ = writeln!(out, "  - {} [{kind}] {reason}", display_name(&item.image));
                }
            }
        }
        out
    }
}

fn display_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

/// Accumulates item results while the batch runs.
#[derive(Debug)]
pub struct SummaryBuilder {
    items: Vec<BatchItemResult>,
    total: usize,
    started_at: String,
    started: std::time::Instant,
}

impl SummaryBuilder {
    pub fn new(total: usize) -> Self {
        Self {
            items: Vec::with_capacity(total),
            total,
            started_at: now_rfc3339(),
            started: std::time::Instant::now(),
        }
    }

    pub fn push(&mut self, item: BatchItemResult) {
        self.items.push(item);
    }

    pub fn completed(&self) -> usize {
        self.items.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(self, cancelled: bool) -> BatchSummary {
        let mut counts = Counts::default();
        for item in &self.items {
            match item.status {
                ItemStatus::Saved => counts.saved += 1,
                ItemStatus::RetriedSaved => counts.retried_saved += 1,
                ItemStatus::Skipped { .. } => counts.skipped += 1,
                ItemStatus::Failed { .. } | ItemStatus::RetriedFailed { .. } => counts.failed += 1,
            }
        }
        let averages = Averages::from_metrics(
            self.items
                .iter()
                .filter(|i| i.status.is_saved())
                .filter_map(|i| i.metrics.as_ref()),
        );
        BatchSummary {
            elapsed: self.started.elapsed(),
            items: self.items,
            total: self.total,
            cancelled,
            started_at: self.started_at,
            finished_at: now_rfc3339(),
            counts,
            averages,
        }
    }
}
