//! # docuflow
//!
//! Routes PDF pages through an LLM-driven extraction pipeline: a per-page
//! Router picks an extraction strategy (or sequence of strategies), a
//! Strategy Set of prompt/parser pairs runs them, a Refinement Analyzer
//! decides whether a page needs another pass, and an Orchestrator drives
//! every page concurrently under a shared rate limiter, retry handler, and
//! provider fallback chain.
//!
//! ## Why this crate?
//!
//! Rendering a PDF page to an image and asking a vision LLM to describe it
//! is easy. Doing it reliably across thousands of pages — with providers
//! that rate-limit, throttle, refuse, or simply go down mid-run, and with
//! page content too varied for any single prompt to handle well — is the
//! hard part. This crate is the control loop that makes that reliable: pick
//! the cheapest strategy that will work, retry what's worth retrying, fall
//! over to another model when one is unrecoverable, and never let one bad
//! page take down the rest of the document.
//!
//! ## Pipeline overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. render     rasterise each page via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. route      vision-LLM analysis → validated ExtractionPlan       (C5)
//!  ├─ 3. extract    run the plan's steps through the Strategy Set        (C6/C7)
//!  ├─ 4. merge      consolidate per-step results into one PageResult     (C8)
//!  ├─ 5. refine     optionally extend the plan and re-extract, bounded   (C9)
//!  └─ 6. orchestrate  all of the above, per page, concurrently           (C10)
//! ```
//!
//! Every LLM call in steps 2–5 passes through the same resilience layer:
//! rate-limited (C2), retried with backoff (C3), and walked across a
//! provider fallback chain (C4) before the call is considered failed.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docuflow::{process_document, ModelRegistry, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ModelRegistry::from_yaml_file(std::path::Path::new("models.yaml"))?;
//!     let config = PipelineConfig::builder(registry)
//!         .concurrency_limit(10)
//!         .rate_limit_per_minute(60)
//!         .build()?;
//!
//!     let output = process_document("document.pdf", &config).await?;
//!     println!("{} pages, {} errors", output.pages.len(), output.errors.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docuflow` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `bundled` | on    | Embeds the pdfium shared library at compile time via `pdfium-auto` |
//!
//! Disable both to use only the library:
//! ```toml
//! docuflow = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod merger;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod refine;
pub mod router;
pub mod strategy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ModelRegistry, PipelineConfig, PipelineConfigBuilder};
pub use error::{CallError, ErrorKind, PageError, PipelineError};
pub use model::{
    DocumentOutput, ExtractionContent, ExtractionPlan, ExtractionResult, ExtractionStep,
    ExtractionStrategy, KeySection, LlmModelSpec, PageComplexity, PageInput, PageResult,
    RouterAnalysis, VisualElement,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};

/// Run the whole pipeline over every page of `pdf_path`: render, route,
/// extract, merge, and refine, concurrently, bounded by
/// `config.concurrency_limit` and `config.rate_limit_per_minute`.
///
/// Returns `Err` only for whole-run failures that happen before any page is
/// processed (unreadable file, wrong password, pdfium binding failure).
/// Per-page failures never propagate here — they are recorded in the
/// returned [`DocumentOutput::errors`] list instead, so the caller always
/// gets partial results for every recoverable page.
pub async fn process_document(
    pdf_path: impl AsRef<std::path::Path>,
    config: &PipelineConfig,
) -> Result<DocumentOutput, PipelineError> {
    let path = pipeline::input::resolve_local_pdf(&pdf_path.as_ref().to_string_lossy())?;
    let pages = pipeline::render::render_document(&path, DEFAULT_MAX_RENDERED_PIXELS).await?;
    Ok(orchestrator::run(pages, config).await)
}

/// Longest-edge cap (pixels) applied when rasterising pages — see
/// [`pipeline::render`]'s module docs for why this is a pixel cap rather
/// than a DPI setting.
pub const DEFAULT_MAX_RENDERED_PIXELS: u32 = 2048;
