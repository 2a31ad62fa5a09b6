//! Document ingestion stages: turning a local PDF file into the
//! [`crate::model::PageInput`] list the Orchestrator feeds into routing and
//! extraction.
//!
//! ## Data flow
//!
//! ```text
//! input ──▶ render ──▶ encode
//! (path)    (pdfium)   (base64)
//! ```
//!
//! 1. [`input`]  — validate the user-supplied local path (existence,
//!    permission, `%PDF` magic bytes)
//! 2. [`render`] — rasterise every page and extract its native text layer;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`] — PNG-encode and base64-wrap each rendered page for the
//!    vision-LLM request body

pub mod encode;
pub mod input;
pub mod render;
