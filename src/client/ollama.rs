use super::{is_supported_image, types::*, VisionClient};
use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client as HttpClient;
use std::time::Duration;
use tracing::{debug, info, warn};

const BODY_EXCERPT_CHARS: usize = 200;

/// Blocking client for the Ollama HTTP API.
pub struct OllamaClient {
    http: HttpClient,
    host: String,
    list_timeout: Duration,
}

impl OllamaClient {
    pub fn new(host: &str, list_timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            list_timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn chat(&self, req: &AnalysisRequest) -> Result<ChatResponse, String> {
        let bytes = std::fs::read(&req.image)
            .map_err(|e| format!("reading image {}: {e}", req.image.display()))?;
        let encoded = BASE64.encode(bytes);

        let body = ChatRequest {
            model: &req.model,
            stream: false,
            messages: vec![ChatMessage {
                role: "user",
                content: &req.prompt,
                images: vec![encoded],
            }],
        };

        let url = format!("{}/api/chat", req.host.trim_end_matches('/'));
        debug!("POST {url} model={} timeout={:?}", req.model, req.timeout);

        let resp = self
            .http
            .post(&url)
            .timeout(req.timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    format!("request timed out after {:?}", req.timeout)
                } else if e.is_connect() {
                    format!("cannot connect to {}: {e}", req.host)
                } else {
                    format!("request failed: {e}")
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            let excerpt: String = text.chars().take(BODY_EXCERPT_CHARS).collect();
            return Err(format!("server returned {status}: {}", excerpt.trim()));
        }

        resp.json::<ChatResponse>()
            .map_err(|e| format!("decoding server response: {e}"))
    }
}

impl VisionClient for OllamaClient {
    fn analyze(&self, req: &AnalysisRequest) -> AnalysisOutcome {
        if !req.image.exists() {
            return AnalysisOutcome::failure(format!(
                "image file not found: {}",
                req.image.display()
            ));
        }
        if !is_supported_image(&req.image) {
            return AnalysisOutcome::failure(format!(
                "unsupported image format: {}",
                req.image.display()
            ));
        }

        info!("analyzing {} with model {}", req.image.display(), req.model);
        let resp = match self.chat(req) {
            Ok(r) => r,
            Err(reason) => {
                warn!("analysis failed for {}: {reason}", req.image.display());
                return AnalysisOutcome::Failure { reason };
            }
        };

        let metrics = resp.metrics();
        let text = resp.message.map(|m| m.content).unwrap_or_default();
        if text.trim().is_empty() {
            return AnalysisOutcome::failure("server returned an empty response");
        }

        match metrics.tokens_per_second() {
            Some(tps) => info!(
                "analysis complete: {} chars, {} tokens, {tps:.2} tok/s",
                text.len(),
                metrics.eval_count.unwrap_or(0)
            ),
            None => info!("analysis complete: {} chars", text.len()),
        }

        AnalysisOutcome::Success { text, metrics }
    }

    fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.host);
        let resp = self
            .http
            .get(&url)
            .timeout(self.list_timeout)
            .send()
            .with_context(|| format!("connecting to {}", self.host))?;

        if !resp.status().is_success() {
            return Err(anyhow!("listing models failed with status: {}", resp.status()));
        }

        let tags: TagsResponse = resp
            .json()
            .with_context(|| "parsing model list")?;
        let models: Vec<String> = tags
            .models
            .iter()
            .map(|m| m.id().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        debug!("found {} models on {}", models.len(), self.host);
        Ok(models)
    }
}
