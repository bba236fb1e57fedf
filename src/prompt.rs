use crate::{config::Prompt, util::expand_tilde, writer::OutputFormats};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_PROMPT: &str = "Describe this image in detail. Cover the main subject, \
the setting, notable objects, colors, lighting and composition, and any visible text. \
Write plain prose in a few short paragraphs without headings or lists.";

pub const MIN_PROMPT_CHARS: usize = 10;

/// Read a prompt file, trimming surrounding whitespace.
pub fn load_prompt(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading prompt file: {}", path.display()))?;
    let prompt = raw.trim();
    if prompt.is_empty() {
        bail!("prompt file is empty: {}", path.display());
    }
    info!("loaded prompt from {} ({} chars)", path.display(), prompt.chars().count());
    Ok(prompt.to_string())
}

pub fn validate_prompt(prompt: &str) -> Result<()> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        bail!("prompt is empty");
    }
    if trimmed.chars().count() < MIN_PROMPT_CHARS {
        bail!("prompt is too short (minimum {MIN_PROMPT_CHARS} characters)");
    }
    Ok(())
}

pub fn preset_path(prompts_dir: &Path, name: &str) -> PathBuf {
    prompts_dir.join(format!("{name}.txt"))
}

/// Pick the prompt text: explicit file, then preset, then the built-in one.
/// A file that is missing falls back with a warning; one that exists but is
/// empty or unreadable is an error.
pub fn resolve_prompt(cfg: &Prompt) -> Result<String> {
    let source = if !cfg.file.is_empty() {
        Some(expand_tilde(&cfg.file))
    } else if !cfg.preset.is_empty() {
        Some(preset_path(&expand_tilde(&cfg.prompts_dir), &cfg.preset))
    } else {
        None
    };

    let prompt = match source {
        Some(path) if path.is_file() => load_prompt(&path)?,
        Some(path) => {
            warn!("prompt file not found: {}; using built-in prompt", path.display());
            DEFAULT_PROMPT.to_string()
        }
        None => {
            debug!("no prompt file configured; using built-in prompt");
            DEFAULT_PROMPT.to_string()
        }
    };
    validate_prompt(&prompt)?;
    Ok(prompt)
}

/// Optional artifacts a preset turns on by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatBundle {
    pub yaml: bool,
    pub metadata: bool,
}

const YAML_PRESETS: &[&str] = &[
    "photoprism",
    "museum_archive",
    "stock_photography",
    "ecommerce",
    "nft_metadata",
];

const METADATA_PRESETS: &[&str] = &[
    "photoprism",
    "museum_archive",
    "stock_photography",
    "technical_photo_analysis",
];

impl FormatBundle {
    pub fn for_preset(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        Self {
            yaml: YAML_PRESETS.contains(&name.as_str()),
            metadata: METADATA_PRESETS.contains(&name.as_str()),
        }
    }

    /// Bundles only ever add artifacts on top of what was requested.
    pub fn apply(self, formats: OutputFormats) -> OutputFormats {
        OutputFormats {
            yaml: formats.yaml || self.yaml,
            metadata: formats.metadata || self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundles_follow_preset_lists() {
        let p = FormatBundle::for_preset("photoprism");
        assert!(p.yaml && p.metadata);

        let e = FormatBundle::for_preset("ecommerce");
        assert!(e.yaml && !e.metadata);

        let t = FormatBundle::for_preset("technical_photo_analysis");
        assert!(!t.yaml && t.metadata);

        assert_eq!(FormatBundle::for_preset("default"), FormatBundle::default());
    }

    #[test]
    fn bundle_never_removes_requested_formats() {
        let requested = OutputFormats {
            yaml: true,
            metadata: true,
        };
        assert_eq!(FormatBundle::default().apply(requested), requested);
    }

    #[test]
    fn short_prompts_are_invalid() {
        assert!(validate_prompt("   ").is_err());
        assert!(validate_prompt("describe").is_err());
        assert!(validate_prompt(DEFAULT_PROMPT).is_ok());
    }
}
