//! CLI binary for docstage.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the landed files through the pipeline and prints
//! the resulting records.

use anyhow::{Context, Result};
use clap::Parser;
use docstage::{
    DocumentRecord, DocumentRequest, DocumentStore, JsonFileStore, Pipeline,
    PipelineConfig, PipelineProgressCallback, PipelineRun, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar counting documents, one log line per stage
/// event. Lines from concurrent documents interleave, so each carries its id.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, id: &str, stage: Stage) {
        self.bar.set_message(format!("{id}: {stage}"));
    }

    fn on_stage_complete(&self, id: &str, stage: Stage, duration_secs: f64) {
        self.bar.println(format!(
            "  {} {:<40} {:<26} {}",
            green("✓"),
            id,
            stage.flag_name(),
            dim(&format!("{duration_secs:.1}s")),
        ));
    }

    fn on_stage_error(&self, id: &str, stage: Stage, error: String) {
        // Keep one line per event.
        let first_line = error.lines().next().unwrap_or_default();
        let msg: String = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40} {:<26} {}",
            red("✗"),
            id,
            stage.flag_name(),
            red(&msg),
        ));
    }

    fn on_document_complete(&self, _id: &str, success: bool) {
        if !success {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract an invoice, storing the record under ./records
  docstage invoice.pdf --prompt "Extract the invoice header" --schema invoice.schema.json

  # Several files, four at a time, retrying flaky model calls twice
  docstage inbox/*.pdf --prompt-file prompt.txt --schema schema.json -c 4 --max-stage-retries 2

  # Keep the ids the landing zone would produce
  docstage scan.pdf --blob-prefix datasets/default/ --prompt-file p.txt --schema s.json

  # Print a stored record
  docstage --show datasets__default__scan.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY / AZURE_OPENAI_API_KEY / ANTHROPIC_API_KEY   Provider credentials
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, azure, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  AZURE_OPENAI_MODEL_DEPLOYMENT_NAME  Deployment recorded in model_input
  PDFIUM_DYNAMIC_LIB_PATH Directory containing libpdfium
  RUST_LOG                Log filter (overrides --verbose/--quiet)
"#;

/// Run landed PDFs through OCR, schema-driven extraction and summarisation.
#[derive(Parser, Debug)]
#[command(
    name = "docstage",
    version,
    about = "Run landed PDFs through OCR, schema-driven LLM extraction and summarisation",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Landed PDF files to process.
    #[arg(required_unless_present = "show")]
    inputs: Vec<PathBuf>,

    /// Extraction instructions.
    #[arg(long, conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// File containing the extraction instructions.
    #[arg(long, env = "DOCSTAGE_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// File containing the example JSON schema.
    #[arg(long, env = "DOCSTAGE_SCHEMA")]
    schema: Option<PathBuf>,

    /// Directory holding one JSON record per document.
    #[arg(long, env = "DOCSTAGE_STORE", default_value = "records")]
    store: PathBuf,

    /// Prefix prepended to each file's path to form its blob name.
    #[arg(long, env = "DOCSTAGE_BLOB_PREFIX", default_value = "")]
    blob_prefix: String,

    /// Print the stored record with this id and exit.
    #[arg(long)]
    show: Option<String>,

    /// Maximum page images attached to the extraction call.
    #[arg(long, env = "DOCSTAGE_MAX_IMAGES", default_value_t = 10)]
    max_images: usize,

    /// Combined image payload limit in megabytes.
    #[arg(long, env = "DOCSTAGE_VISION_LIMIT_MB", default_value_t = 20)]
    vision_limit_mb: u64,

    /// Model deployment recorded with each document.
    #[arg(long, env = "AZURE_OPENAI_MODEL_DEPLOYMENT_NAME")]
    model_deployment: Option<String>,

    /// LLM model ID (defaults to the deployment name).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, azure, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Retries for a stage whose backend failed.
    #[arg(long, env = "DOCSTAGE_MAX_STAGE_RETRIES", default_value_t = 0)]
    max_stage_retries: u32,

    /// Initial retry backoff in milliseconds.
    #[arg(long, env = "DOCSTAGE_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Documents processed concurrently.
    #[arg(short, long, env = "DOCSTAGE_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Longest edge of rasterised pages in pixels.
    #[arg(long, env = "DOCSTAGE_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Parent directory for temporary page images.
    #[arg(long, env = "DOCSTAGE_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCSTAGE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "DOCSTAGE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Print final records as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCSTAGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSTAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSTAGE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store = Arc::new(
        JsonFileStore::open(&cli.store)
            .await
            .with_context(|| format!("Failed to open store {:?}", cli.store))?,
    );

    // ── Show mode ────────────────────────────────────────────────────────
    if let Some(ref id) = cli.show {
        let record = store
            .get(id)
            .await
            .context("Failed to read record")?
            .with_context(|| format!("No record with id '{id}'"))?;
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialise record")?
        );
        return Ok(());
    }

    // ── Requests ─────────────────────────────────────────────────────────
    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(p), _) => p.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        (None, None) => anyhow::bail!("One of --prompt or --prompt-file is required"),
    };
    let schema_path = cli.schema.as_ref().context("--schema is required")?;
    let schema = tokio::fs::read_to_string(schema_path)
        .await
        .with_context(|| format!("Failed to read schema from {:?}", schema_path))?;
    serde_json::from_str::<serde_json::Value>(&schema)
        .with_context(|| format!("Schema {:?} is not valid JSON", schema_path))?;

    let requests: Vec<DocumentRequest> = cli
        .inputs
        .iter()
        .map(|path| {
            let request = DocumentRequest::new(path, prompt.clone(), schema.clone());
            let blob_name = format!("{}{}", cli.blob_prefix, request.blob_name);
            request.with_blob_name(blob_name)
        })
        .collect();

    // ── Pipeline ─────────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let progress = show_progress.then(|| CliProgressCallback::new(requests.len()));

    let mut builder =
        Pipeline::llm_builder(config, store).context("Failed to configure LLM backends")?;
    if let Some(ref cb) = progress {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let pipeline = builder.build().context("Failed to build pipeline")?;

    let runs = pipeline.run_batch(requests, cli.concurrency).await;

    if let Some(ref cb) = progress {
        cb.finish();
    }

    // ── Report ───────────────────────────────────────────────────────────
    let failed = runs.iter().filter(|r| !r.is_success()).count();
    if cli.json {
        let records: Vec<&DocumentRecord> = runs.iter().map(|r| &r.record).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise records")?
        );
    } else if !cli.quiet {
        for run in &runs {
            print_run(run);
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed}/{} documents failed", runs.len());
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_images(cli.max_images)
        .vision_limit_mb(cli.vision_limit_mb)
        .max_stage_retries(cli.max_stage_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .max_rendered_pixels(cli.max_pixels)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    // The record must name the model that ran, even when only --model is set.
    if let Some(d) = cli.model_deployment.as_ref().or(cli.model.as_ref()) {
        builder = builder.model_deployment(d.clone());
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_root(dir.clone());
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }

    builder.build().context("Invalid configuration")
}

fn print_run(run: &PipelineRun) {
    let record = &run.record;
    let mark = if run.is_success() { green("✔") } else { red("✘") };
    eprintln!(
        "{} {}  {}  {}",
        mark,
        bold(record.id()),
        dim(&format!("{:.1}s", run.duration_secs)),
        record.extracted_data.classification
    );
    for stage in Stage::ALL {
        let done = record.state().is_complete(stage);
        let secs = record
            .state()
            .duration(stage)
            .map(|s| format!("{s:.2}s"))
            .unwrap_or_default();
        eprintln!(
            "    {} {:<26} {}",
            if done { green("✓") } else { dim("·") },
            stage.flag_name(),
            dim(&secs)
        );
    }
    for err in record.errors() {
        eprintln!("    {} {}", red("!"), err);
    }
}
