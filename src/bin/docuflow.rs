//! CLI binary for docuflow.
//!
//! A thin shim over the library crate: parse flags into a `PipelineConfig`
//! and a `ModelRegistry`, run `process_document`, and write
//! `extraction_results.json` into the output directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use docuflow::{process_document, ModelRegistry, PipelineConfig, PipelineProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-page log
/// lines using [indicatif]. Pages are processed concurrently, so every method
/// here must tolerate out-of-order, concurrent calls.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_document_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Routing pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_page_routing_start(&self, page_index: usize, _total_pages: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_index, Instant::now());
        self.bar.set_message(format!("page {page_index}"));
    }

    fn on_page_complete(&self, page_index: usize, total_pages: usize, successful_steps: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<16}  {}",
            green("✓"),
            page_index,
            total_pages,
            dim(&format!("{successful_steps} step(s) ok")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_index: usize, total_pages: usize, error: String) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.len() > 80 {
            format!("{}\u{2026}", &error[..79])
        } else {
            error
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_index,
            total_pages,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic extraction, default model registry
  docuflow document.pdf --output_dir out/

  # Custom model registry with fallback chains
  docuflow document.pdf --output_dir out/ --models models.yaml

  # More concurrent pages, tighter call-rate budget
  docuflow document.pdf --output_dir out/ --concurrency-limit 20 --rate-limit-per-minute 30

  # Enable iterative refinement, bounded to 3 cycles
  docuflow document.pdf --output_dir out/ --iterative-refinement --max-refinement-cycles 3

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  PDFIUM_LIB_PATH         Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

A `.env` file in the current directory is loaded automatically (API keys,
mainly) — this only happens here in the binary; the library never touches
the environment on its own.

EXIT CODES:
  0   every page extracted with at least one successful step
  2   partial success — some pages recorded in `errors`
  1   the run could not start at all (bad file, invalid registry, ...)
"#;

/// Route PDF pages through an LLM-driven extraction pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "docuflow",
    version,
    about = "Route PDF pages through an LLM-driven document extraction pipeline",
    long_about = "Renders each page of a PDF, routes it through a Router/Strategy/Refinement \
pipeline backed by vision LLMs, and writes the consolidated per-page extraction results as JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: String,

    /// Directory to write `extraction_results.json` into (created if missing).
    #[arg(long, env = "DOCUFLOW_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Path to a model-registry YAML file. Falls back to a
    /// built-in single-provider registry if not given.
    #[arg(long, env = "DOCUFLOW_MODELS")]
    models: Option<PathBuf>,

    /// Max pages processed concurrently.
    #[arg(long, env = "DOCUFLOW_CONCURRENCY_LIMIT", default_value_t = 10)]
    concurrency_limit: usize,

    /// Global LLM-call budget per minute, shared across every page.
    #[arg(long, env = "DOCUFLOW_RATE_LIMIT_PER_MINUTE", default_value_t = 60)]
    rate_limit_per_minute: u32,

    /// Retries per call, inclusive of the initial attempt.
    #[arg(long, env = "DOCUFLOW_RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    retry_max_attempts: u32,

    /// Initial retry backoff, in seconds (doubles per attempt).
    #[arg(long, env = "DOCUFLOW_RETRY_INITIAL_DELAY", default_value_t = 1.0)]
    retry_initial_delay: f64,

    /// Enable the iterative refinement loop.
    #[arg(long, env = "DOCUFLOW_ITERATIVE_REFINEMENT")]
    iterative_refinement: bool,

    /// Hard ceiling on refinement cycles per page.
    #[arg(long, env = "DOCUFLOW_MAX_REFINEMENT_CYCLES", default_value_t = 2)]
    max_refinement_cycles: u32,

    /// Per-call timeout, in seconds.
    #[arg(long, env = "DOCUFLOW_CALL_TIMEOUT", default_value_t = 60)]
    call_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "DOCUFLOW_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCUFLOW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCUFLOW_QUIET")]
    quiet: bool,
}

const DEFAULT_REGISTRY_YAML: &str = r#"
default_models:
  router: gpt-4.1-nano
  extraction: gpt-4.1-nano
  summarizer: gpt-4.1-mini
models:
  gpt-4.1-nano:
    provider: openai
    token_limit: 128000
    is_vision_capable: true
    fallback: gpt-4.1-mini
  gpt-4.1-mini:
    provider: openai
    token_limit: 128000
    is_vision_capable: true
    fallback: null
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load a `.env` file if present — library never does this itself.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
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
        .with_writer(std::io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────
    #[cfg(feature = "bundled")]
    {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_bundled())
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.set_message("Connecting…");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                            bar.set_prefix("PDF engine");
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    let registry = match &cli.models {
        Some(path) => ModelRegistry::from_yaml_file(path)
            .with_context(|| format!("Invalid model registry '{}'", path.display()))?,
        None => ModelRegistry::from_yaml_str(DEFAULT_REGISTRY_YAML)
            .context("Invalid built-in model registry")?,
    };

    let progress_cb: Option<Arc<dyn PipelineProgressCallback>> = if show_progress {
        Some(CliProgressCallback::new_dynamic())
    } else {
        None
    };

    let mut builder = PipelineConfig::builder(registry)
        .concurrency_limit(cli.concurrency_limit)
        .rate_limit_per_minute(cli.rate_limit_per_minute)
        .retry_max_attempts(cli.retry_max_attempts)
        .retry_initial_delay(cli.retry_initial_delay)
        .iterative_refinement_enabled(cli.iterative_refinement)
        .max_refinement_cycles(cli.max_refinement_cycles)
        .call_timeout(Duration::from_secs(cli.call_timeout));

    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid pipeline configuration")?;

    // ── Run the pipeline ──────────────────────────────────────────────────
    let run_started = Instant::now();
    let output = process_document(&cli.input, &config)
        .await
        .context("Document processing failed")?;
    let wall_clock_secs = run_started.elapsed().as_secs_f64();

    let output_dir = docuflow::pipeline::input::resolve_output_dir(
        &cli.output_dir.to_string_lossy(),
    )
    .context("Failed to prepare output directory")?;

    let results_path = output_dir.join("extraction_results.json");
    let json = serde_json::to_string_pretty(&output).context("Failed to serialize results")?;
    tokio::fs::write(&results_path, json)
        .await
        .with_context(|| format!("Failed to write {}", results_path.display()))?;

    // Exit 1 is reserved for the unrecoverable failures already handled
    // above via `?` (bad config, unreadable input) — any page-level failure,
    // even if every page failed, is still a partial-success run.
    let exit_code: i32 = if output.errors.is_empty() { 0 } else { 2 };

    // `executive_summary.json`/`chunks.json` are out of scope (no summarizer
    // or chunker in this crate); `run_summary.json` stands in so `output_dir`
    // is never empty on a successful run even without those downstream tools.
    let summary_path = output_dir.join("run_summary.json");
    let summary = serde_json::json!({
        "pages_processed": output.pages.len(),
        "pages_failed": output.errors.len(),
        "cancelled": output.cancelled,
        "wall_clock_seconds": wall_clock_secs,
        "exit_code": exit_code,
    });
    tokio::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .await
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} wrote {} and {}",
            green("✔"),
            bold(&results_path.display().to_string()),
            bold(&summary_path.display().to_string())
        );
        if output.cancelled {
            eprintln!("{} run was cancelled; results reflect only pages completed beforehand", red("!"));
        }
    }

    if exit_code == 0 {
        Ok(())
    } else {
        std::process::exit(exit_code);
    }
}
