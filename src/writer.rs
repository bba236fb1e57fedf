use crate::exif_embed;
use crate::util::{append_extension, ensure_dir};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwritePolicy {
    #[default]
    Allow,
    Protect,
}

impl OverwritePolicy {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            OverwritePolicy::Allow
        } else {
            OverwritePolicy::Protect
        }
    }
}

/// Optional artifacts. The text file is always written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormats {
    pub yaml: bool,
    pub metadata: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Text,
    Yaml,
    Metadata,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Text => "TXT",
            ArtifactKind::Yaml => "YAML",
            ArtifactKind::Metadata => "EXIF",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("{kind} write failed for {}: {source}", .path.display())]
    Io {
        kind: ArtifactKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} not supported for {}", .path.display())]
    Unsupported { kind: ArtifactKind, path: PathBuf },

    #[error("{kind} encoding failed for {}: {reason}", .path.display())]
    Encode {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },
}

/// Where each artifact for one image lands.
#[derive(Debug, Clone, PartialEq)]
pub struct Targets {
    pub text: PathBuf,
    pub yaml: Option<PathBuf>,
    pub backup: Option<PathBuf>,
}

/// Artifact paths for `image`, computed without touching the disk so callers
/// can filter before any request is made.
pub fn planned_targets(image: &Path, formats: OutputFormats, output_dir: Option<&Path>) -> Targets {
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| image.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let stem = image.file_stem().unwrap_or_default();
    let name = image.file_name().unwrap_or_default();

    Targets {
        text: append_extension(&dir.join(stem), "txt"),
        yaml: formats.yaml.then(|| append_extension(&dir.join(name), "yml")),
        backup: formats.metadata.then(|| append_extension(image, "bak")),
    }
}

impl Targets {
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.text)
            .chain(self.yaml.iter())
            .chain(self.backup.iter())
    }

    /// First target that already exists on disk.
    pub fn existing(&self) -> Option<&PathBuf> {
        self.paths().find(|p| p.exists())
    }
}

/// Context recorded in the YAML sidecar.
#[derive(Debug, Clone, Default)]
pub struct WriteDetails {
    pub model: String,
    pub processing_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteReport {
    pub artifacts: Vec<Artifact>,
    /// Optional artifacts that failed; the item still counts as saved.
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Written(WriteReport),
    Skipped { existing: PathBuf },
}

#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "TakenAt", skip_serializing_if = "Option::is_none")]
    taken_at: Option<String>,
    #[serde(rename = "Details")]
    details: SidecarDetails<'a>,
}

#[derive(Debug, Serialize)]
struct SidecarDetails<'a> {
    #[serde(rename = "AI_Model")]
    ai_model: &'a str,
    #[serde(rename = "AI_Generated")]
    ai_generated: bool,
    #[serde(rename = "Processing_Time")]
    processing_time: Option<f64>,
}

pub struct ResultWriter {
    output_dir: Option<PathBuf>,
    formats: OutputFormats,
    policy: OverwritePolicy,
}

impl ResultWriter {
    pub fn new(output_dir: Option<PathBuf>, formats: OutputFormats, policy: OverwritePolicy) -> Self {
        Self {
            output_dir,
            formats,
            policy,
        }
    }

    pub fn targets(&self, image: &Path) -> Targets {
        planned_targets(image, self.formats, self.output_dir.as_deref())
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    /// Persist an accepted description. Only a text failure is an error;
    /// YAML and metadata failures land in `WriteReport::notes`.
    pub fn write(
        &self,
        image: &Path,
        text: &str,
        details: &WriteDetails,
    ) -> Result<WriteOutcome, WriteError> {
        let targets = self.targets(image);

        if self.policy == OverwritePolicy::Protect {
            if let Some(existing) = targets.existing() {
                info!("skipping {}: {} exists", image.display(), existing.display());
                return Ok(WriteOutcome::Skipped {
                    existing: existing.clone(),
                });
            }
        }

        let mut report = WriteReport::default();

        write_file(ArtifactKind::Text, &targets.text, text.as_bytes())?;
        info!("saved description to {}", targets.text.display());
        report.artifacts.push(Artifact {
            kind: ArtifactKind::Text,
            path: targets.text.clone(),
        });

        if let Some(yaml_path) = &targets.yaml {
            match write_sidecar(image, yaml_path, text, details) {
                Ok(()) => report.artifacts.push(Artifact {
                    kind: ArtifactKind::Yaml,
                    path: yaml_path.clone(),
                }),
                Err(e) => {
                    warn!("{e}");
                    report.notes.push(e.to_string());
                }
            }
        }

        if self.formats.metadata {
            match embed(image, text) {
                Ok(()) => report.artifacts.push(Artifact {
                    kind: ArtifactKind::Metadata,
                    path: image.to_path_buf(),
                }),
                Err(e) => {
                    warn!("{e}");
                    report.notes.push(e.to_string());
                }
            }
        }

        Ok(WriteOutcome::Written(report))
    }
}

fn write_file(kind: ArtifactKind, path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let io_err = |source: std::io::Error| WriteError::Io {
        kind,
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    std::fs::write(path, bytes).map_err(io_err)
}

fn write_sidecar(
    image: &Path,
    path: &Path,
    text: &str,
    details: &WriteDetails,
) -> Result<(), WriteError> {
    let sidecar = Sidecar {
        title: image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        description: text,
        taken_at: exif_embed::capture_time(image),
        details: SidecarDetails {
            ai_model: &details.model,
            ai_generated: true,
            processing_time: details.processing_seconds.map(round_ms),
        },
    };
    let yaml = serde_yaml::to_string(&sidecar).map_err(|e| WriteError::Encode {
        kind: ArtifactKind::Yaml,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_file(ArtifactKind::Yaml, path, yaml.as_bytes())?;
    info!("saved YAML sidecar to {}", path.display());
    Ok(())
}

fn embed(image: &Path, text: &str) -> Result<(), WriteError> {
    if !exif_embed::is_embeddable(image) {
        return Err(WriteError::Unsupported {
            kind: ArtifactKind::Metadata,
            path: image.to_path_buf(),
        });
    }
    exif_embed::embed_description(image, text)
        .map(|_| ())
        .map_err(|e| WriteError::Encode {
            kind: ArtifactKind::Metadata,
            path: image.to_path_buf(),
            reason: format!("{e:#}"),
        })
}

fn round_ms(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

/// Create the output directory up front so a bad path fails the run early.
pub fn prepare_output_dir(dir: Option<&Path>) -> anyhow::Result<()> {
    match dir {
        Some(d) => ensure_dir(d),
        None => Ok(()),
    }
}
