use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub prompt: Prompt,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).with_context(|| "serializing config")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub model: String,
    pub timeout_seconds: u64,
}
impl Server {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}
impl Default for Server {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".into(),
            model: "llava".into(),
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompt {
    /// Prompt file. Empty means "use the preset, else the built-in prompt".
    pub file: String,
    pub prompts_dir: String,
    pub preset: String,
}
impl Default for Prompt {
    fn default() -> Self {
        Self {
            file: "".into(),
            prompts_dir: "prompts".into(),
            preset: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    /// Output directory. Empty means "next to each image".
    pub dir: String,
    pub overwrite: bool,
    pub write_yaml: bool,
    pub write_metadata: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            dir: "".into(),
            overwrite: true,
            write_yaml: false,
            write_metadata: false,
        }
    }
}

/// Thresholds for the response validator. All heuristic; tune freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    pub min_chars: usize,
    pub max_words: usize,
    pub min_avg_word_length: f32,
    pub max_avg_word_length: f32,
    pub vowel_check_min_len: usize,
    pub vowel_check_min_words: usize,
    pub max_vowelless_ratio: f32,
    pub repetition_min_tokens: usize,
    pub max_token_fraction: f32,
    pub max_ngram: usize,
    pub max_contiguous_repeats: usize,
    pub min_alnum_ratio: f32,
    /// Letters among non-whitespace characters; keeps digit dumps out.
    pub min_alpha_ratio: f32,
}
impl Default for Validation {
    fn default() -> Self {
        Self {
            min_chars: 20,
            max_words: 10_000,
            min_avg_word_length: 2.0,
            max_avg_word_length: 15.0,
            vowel_check_min_len: 4,
            vowel_check_min_words: 5,
            max_vowelless_ratio: 0.5,
            repetition_min_tokens: 10,
            max_token_fraction: 0.4,
            max_ngram: 4,
            max_contiguous_repeats: 5,
            min_alnum_ratio: 0.70,
            min_alpha_ratio: 0.40,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    /// Run the manual "retry failed items" pass once after the batch.
    pub retry_failed: bool,
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
