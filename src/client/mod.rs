pub mod ollama;
pub mod types;

use anyhow::Result;
use std::path::Path;

pub use ollama::OllamaClient;
pub use types::{AnalysisOutcome, AnalysisRequest, PerfMetrics};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];

const VISION_KEYWORDS: &[&str] = &["llava", "bakllava", "moondream", "vision", "clip"];

/// A vision-model server. `analyze` performs exactly one request and never
/// retries; retry policy belongs to the batch controller.
pub trait VisionClient {
    fn analyze(&self, req: &AnalysisRequest) -> AnalysisOutcome;
    fn list_models(&self) -> Result<Vec<String>>;

    fn check_connection(&self) -> Result<()> {
        self.list_models().map(|_| ())
    }

    /// Models whose names look vision-capable, or every model when none do.
    fn vision_models(&self) -> Result<Vec<String>> {
        let all = self.list_models()?;
        Ok(filter_vision_models(all))
    }
}

pub fn filter_vision_models(all: Vec<String>) -> Vec<String> {
    let vision: Vec<String> = all
        .iter()
        .filter(|m| {
            let lower = m.to_lowercase();
            VISION_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .cloned()
        .collect();
    if vision.is_empty() { all } else { vision }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
