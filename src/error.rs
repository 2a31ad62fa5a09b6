//! Error types for the docuflow library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot start or cannot continue
//!   at all (bad input file, wrong password, invalid model registry). Returned
//!   as `Err(PipelineError)` from [`crate::process_document`].
//!
//! * [`PageError`] — **Non-fatal**: a single page could not be recovered by
//!   any of the routing/retry/fallback machinery. Stored in the `errors` list
//!   of [`crate::model::DocumentOutput`] so callers can inspect partial
//!   success rather than losing the whole document to one bad page.
//!
//! [`ErrorKind`] is the ten-way taxonomy that the LLM client, retry handler,
//! and fallback chain classify every failure into; it is carried inside
//! [`CallError`] (an in-flight call failure, never exposed outside this
//! crate's resilience layer) and inside [`PageError`] (the externally visible
//! record of why a page never recovered).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The ten-way error taxonomy every LLM call failure is classified into.
///
/// C3 (retry) and C4 (fallback) react differently per kind: see
/// [`ErrorKind::is_retryable`] and [`ErrorKind::is_fallback_recoverable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 5xx, connection reset, or a per-call timeout.
    TransientHttp,
    /// 429 or a provider-specific throttle signal.
    RateLimited,
    /// 401/403 — missing or rejected credential.
    AuthFailure,
    /// 400/422 — malformed request, oversized image, token overflow.
    InvalidRequest,
    /// Provider refused to answer (safety/content filter).
    ContentPolicy,
    /// A response was received but could not be parsed into the expected shape.
    ParseFailure,
    /// Configuration failed validation (model registry, builder).
    ValidationFailure,
    /// Every model in a fallback chain was tried and failed.
    FallbackExhausted,
    /// The caller cancelled the operation.
    Cancelled,
    /// Anything else.
    TerminalOther,
}

impl ErrorKind {
    /// C3 retries only transient, call-rate failures.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientHttp | ErrorKind::RateLimited)
    }

    /// C4 falls to the next model on everything that isn't itself recoverable
    /// by a retry loop on the *same* model: auth failures, invalid requests,
    /// content-policy refusals, and anything uncategorized move to the next
    /// model in the chain immediately.
    pub fn is_fallback_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::AuthFailure
                | ErrorKind::InvalidRequest
                | ErrorKind::ContentPolicy
                | ErrorKind::TerminalOther
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::TransientHttp => "transient_http",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ContentPolicy => "content_policy",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::FallbackExhausted => "fallback_exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::TerminalOther => "terminal_other",
        };
        write!(f, "{s}")
    }
}

/// A single failed attempt to call one model, as produced by the LLM Client
/// (C1) and consumed by the Retry Handler (C3) and Fallback Chain (C4).
///
/// Never surfaced outside the resilience layer; by the time a call result
/// reaches the Router, Extractor, or Refinement Analyzer it has already been
/// folded into an `ExtractionResult` or a [`PageError`].
#[derive(Debug, Clone, Error)]
#[error("{model}: {kind}: {message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub model: String,
    pub message: String,
}

impl CallError {
    pub fn new(kind: ErrorKind, model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            message: message.into(),
        }
    }
}

/// Fatal, whole-run errors. Anything in this enum aborts `process_document`
/// before (or instead of) producing a `DocumentOutput`; the CLI maps every
/// variant to exit code 1.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    #[error("Failed to bind to the pdfium library: {0}")]
    PdfiumBindingFailed(String),

    #[error("Invalid model registry: {0}")]
    InvalidModelRegistry(String),

    #[error("No credential available for provider '{provider}': {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal, per-page error: the page could not be recovered by routing,
/// retry, or fallback, and is reported in `DocumentOutput::errors` rather than
/// aborting the run.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("page {page_index}: {kind}: {detail}")]
pub struct PageError {
    pub page_index: usize,
    pub kind: ErrorKind,
    pub detail: String,
}

impl PageError {
    pub fn new(page_index: usize, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            page_index,
            kind,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::TransientHttp.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::AuthFailure.is_retryable());
        assert!(!ErrorKind::ContentPolicy.is_retryable());
    }

    #[test]
    fn fallback_recoverable_kinds() {
        assert!(ErrorKind::AuthFailure.is_fallback_recoverable());
        assert!(ErrorKind::InvalidRequest.is_fallback_recoverable());
        assert!(ErrorKind::ContentPolicy.is_fallback_recoverable());
        assert!(ErrorKind::TerminalOther.is_fallback_recoverable());
        assert!(!ErrorKind::RateLimited.is_fallback_recoverable());
        assert!(!ErrorKind::Cancelled.is_fallback_recoverable());
    }

    #[test]
    fn error_kind_display_matches_taxonomy_names() {
        assert_eq!(ErrorKind::TransientHttp.to_string(), "transient_http");
        assert_eq!(ErrorKind::FallbackExhausted.to_string(), "fallback_exhausted");
    }
}
