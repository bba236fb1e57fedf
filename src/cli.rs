use crate::{
    client::{OllamaClient, VisionClient},
    config::Config,
    discover::collect_images,
    pipeline::{BatchControl, BatchEvent, BatchSettings, Pipeline},
    prompt::{resolve_prompt, FormatBundle},
    report::{BatchSummary, ItemStatus},
    util::ensure_dir,
    writer::{prepare_output_dir, OutputFormats},
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_CONFIG: &str = "vision-describe.toml";
const DEFAULT_LOG_FILE: &str = "vision-describe.log";
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "vision-describe")]
#[command(about = "Batch image descriptions from a local Ollama vision model")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./vision-describe.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Describe images and write the results next to them (or to --output-dir).
    Analyze(AnalyzeArgs),
    /// List the vision models the server offers.
    Models {
        #[arg(long)]
        host: Option<String>,
    },
    /// Print the effective configuration as TOML.
    ConfigShow {},
}

#[derive(clap::Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// Image files and/or directories.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    /// Prompt file; overrides the preset.
    #[arg(long)]
    pub prompt: Option<PathBuf>,

    /// Prompt preset name from the prompts directory.
    #[arg(long)]
    pub preset: Option<String>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Skip images whose outputs already exist.
    #[arg(long)]
    pub no_overwrite: bool,

    /// Also write a YAML sidecar per image.
    #[arg(long)]
    pub yaml: bool,

    /// Also embed the description into JPEG EXIF.
    #[arg(long)]
    pub embed_metadata: bool,

    #[arg(long)]
    pub recursive: bool,

    /// Retry failed items once more after the batch.
    #[arg(long)]
    pub retry_failed: bool,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl AnalyzeArgs {
    /// CLI flags win over the config file.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.server.host = host.clone();
        }
        if let Some(model) = &self.model {
            cfg.server.model = model.clone();
        }
        if let Some(prompt) = &self.prompt {
            cfg.prompt.file = prompt.display().to_string();
        }
        if let Some(preset) = &self.preset {
            cfg.prompt.preset = preset.clone();
        }
        if let Some(dir) = &self.output_dir {
            cfg.output.dir = dir.display().to_string();
        }
        if self.no_overwrite {
            cfg.output.overwrite = false;
        }
        cfg.output.write_yaml |= self.yaml;
        cfg.output.write_metadata |= self.embed_metadata;
        cfg.batch.recursive |= self.recursive;
        cfg.batch.retry_failed |= self.retry_failed;
    }
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref())? {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let (verbose, quiet) = match &args.cmd {
        Command::Analyze(a) => (a.verbose, a.quiet),
        _ => (false, false),
    };
    let level = resolve_log_level(args.log_level.as_deref(), verbose, quiet, &cfg);
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&level, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Analyze(a) => analyze(cfg, a),
        Command::Models { host } => models(&cfg, host.as_deref()),
        Command::ConfigShow {} => {
            print!("{}", cfg.to_toml()?);
            Ok(())
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = user {
        if !p.exists() {
            return Err(anyhow!("config file not found: {}", p.display()));
        }
        return Ok(Some(p.to_path_buf()));
    }
    let default = PathBuf::from(DEFAULT_CONFIG);
    Ok(default.exists().then_some(default))
}

/// `--log-level`, then `-v`/`-q`, then the config. `RUST_LOG` beats all of
/// these inside `init_logging`.
pub fn resolve_log_level(flag: Option<&str>, verbose: bool, quiet: bool, cfg: &Config) -> String {
    if let Some(level) = flag {
        return level.to_string();
    }
    if verbose {
        return "debug".into();
    }
    if quiet {
        return "warn".into();
    }
    cfg.logging.level.clone()
}

fn init_logging(level: &str, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout carries only results.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(DEFAULT_LOG_FILE))
}

fn models(cfg: &Config, host: Option<&str>) -> Result<()> {
    let host = host.unwrap_or(cfg.server.host.as_str());
    let client = OllamaClient::new(host, LIST_TIMEOUT)?;
    let models = client
        .vision_models()
        .with_context(|| format!("listing models at {host}"))?;
    if models.is_empty() {
        warn!("no models installed on {host}");
    }
    for m in models {
        println!("{m}");
    }
    Ok(())
}

fn analyze(mut cfg: Config, args: &AnalyzeArgs) -> Result<()> {
    args.apply(&mut cfg);

    let images = collect_images(&args.inputs, cfg.batch.recursive)?;
    if images.is_empty() {
        bail!("no supported images found");
    }

    let prompt = resolve_prompt(&cfg.prompt)?;
    let requested = OutputFormats {
        yaml: cfg.output.write_yaml,
        metadata: cfg.output.write_metadata,
    };
    let formats = FormatBundle::for_preset(&cfg.prompt.preset).apply(requested);
    let settings = BatchSettings::from_config(&cfg, prompt, formats);
    prepare_output_dir(settings.output_dir.as_deref())?;

    let client = OllamaClient::new(&cfg.server.host, LIST_TIMEOUT)?;
    let available = client
        .list_models()
        .with_context(|| format!("cannot reach Ollama at {}", cfg.server.host))?;
    if !available.iter().any(|m| model_matches(m, &cfg.server.model)) {
        warn!(
            "model '{}' not listed by the server; requests may fail",
            cfg.server.model
        );
    }
    info!(
        "analyzing {} images with {} (yaml={}, metadata={})",
        images.len(),
        cfg.server.model,
        formats.yaml,
        formats.metadata
    );

    let pipeline = Arc::new(Pipeline::new(settings, client));
    let control = BatchControl::new();
    {
        let control = control.clone();
        ctrlc::set_handler(move || {
            eprintln!("stopping after the current image...");
            control.cancel();
        })
        .with_context(|| "installing Ctrl-C handler")?;
    }

    let mut summary = run_pass(&pipeline, images, &control, args.quiet)?;
    print_summary(&summary, args.json, args.quiet)?;

    if cfg.batch.retry_failed && summary.has_failures() && !summary.cancelled {
        let failed = summary.retry_candidates();
        info!("retrying {} failed images", failed.len());
        summary = run_pass(&pipeline, failed, &control, args.quiet)?;
        print_summary(&summary, args.json, args.quiet)?;
    }

    if summary.has_failures() {
        bail!("{} images failed", summary.counts.failed);
    }
    Ok(())
}

/// `llava` matches `llava:latest`.
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted || listed.split(':').next() == Some(wanted)
}

fn run_pass(
    pipeline: &Arc<Pipeline<OllamaClient>>,
    images: Vec<PathBuf>,
    control: &BatchControl,
    quiet: bool,
) -> Result<BatchSummary> {
    let handle = Pipeline::spawn(Arc::clone(pipeline), images, control.clone());
    for event in handle.events().iter() {
        if !quiet {
            print_event(&event);
        }
    }
    handle.join()
}

fn print_event(event: &BatchEvent) {
    match event {
        BatchEvent::Started { total } => eprintln!("processing {total} images"),
        BatchEvent::ItemStarted { .. } | BatchEvent::Finished { .. } => {}
        BatchEvent::Retrying { image, reason } => {
            eprintln!("  retrying {}: {reason}", image.display())
        }
        BatchEvent::ItemFinished { result, progress } => {
            let label = match &result.status {
                ItemStatus::Saved => "saved".to_string(),
                ItemStatus::RetriedSaved => "saved after retry".to_string(),
                ItemStatus::Skipped { .. } => "skipped".to_string(),
                ItemStatus::Failed { kind, .. } | ItemStatus::RetriedFailed { kind, .. } => {
                    format!("failed ({kind})")
                }
            };
            eprintln!(
                "[{}] {} {label}",
                progress.status_line(),
                result.image.display()
            );
        }
    }
}

/// `--quiet` keeps only the failed-items section.
fn print_summary(summary: &BatchSummary, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else if quiet {
        print!("{}", summary.render_failures());
    } else {
        print!("{}", summary.render());
    }
    Ok(())
}
