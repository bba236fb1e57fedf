use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One analysis attempt's input. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: PathBuf,
    pub prompt: String,
    pub model: String,
    pub host: String,
    pub timeout: Duration,
}

impl AnalysisRequest {
    pub fn new(
        image: impl Into<PathBuf>,
        prompt: impl Into<String>,
        model: impl Into<String>,
        host: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            image: image.into(),
            prompt: prompt.into(),
            model: model.into(),
            host: host.into(),
            timeout,
        }
    }
}

/// Counters reported by the server. Durations are nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfMetrics {
    pub total_duration_ns: Option<u64>,
    pub load_duration_ns: Option<u64>,
    pub prompt_eval_count: Option<u64>,
    pub prompt_eval_duration_ns: Option<u64>,
    pub eval_count: Option<u64>,
    pub eval_duration_ns: Option<u64>,
}

impl PerfMetrics {
    pub fn tokens_per_second(&self) -> Option<f64> {
        match (self.eval_count, self.eval_duration_ns) {
            (Some(n), Some(d)) if n > 0 && d > 0 => Some(n as f64 / (d as f64 / 1e9)),
            _ => None,
        }
    }

    pub fn total_seconds(&self) -> Option<f64> {
        self.total_duration_ns
            .filter(|d| *d > 0)
            .map(|d| d as f64 / 1e9)
    }

    pub fn is_empty(&self) -> bool {
        *self == PerfMetrics::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Success { text: String, metrics: PerfMetrics },
    Failure { reason: String },
}

impl AnalysisOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        AnalysisOutcome::Failure {
            reason: reason.into(),
        }
    }
}

// Ollama wire format.

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

impl ChatResponse {
    pub fn metrics(&self) -> PerfMetrics {
        PerfMetrics {
            total_duration_ns: self.total_duration,
            load_duration_ns: self.load_duration,
            prompt_eval_count: self.prompt_eval_count,
            prompt_eval_duration_ns: self.prompt_eval_duration,
            eval_count: self.eval_count,
            eval_duration_ns: self.eval_duration,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
}

impl ModelEntry {
    pub fn id(&self) -> &str {
        if self.model.is_empty() {
            &self.name
        } else {
            &self.model
        }
    }
}
