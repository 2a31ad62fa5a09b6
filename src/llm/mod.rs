//! The resilience layer wrapping every outbound LLM call: rate limiting
//! (C2), retry (C3), and provider fallback (C4), composed around the raw
//! client (C1) as `FallbackChain(Retry(RateLimited(RawCall)))`.
//!
//! Callers (the Router, Extractor, and Refinement Analyzer) only ever call
//! [`execute`] — the layering is an implementation detail this module owns.

pub mod client;
pub mod fallback;
pub mod rate_limiter;
pub mod retry;

use std::time::Duration;

use edgequake_llm::ImageData;
use tokio_util::sync::CancellationToken;

use crate::config::ModelRegistry;
use crate::error::{CallError, ErrorKind};
pub use client::ResponseFormat;
use client::LlmClient;
use fallback::call_with_fallback;
use rate_limiter::RateLimiter;

/// One fully-wrapped LLM call: rate-limited, retried, and fallen-back across
/// the model registry's fallback chain starting at `model_id`. Returns the
/// raw text content and the id of whichever model actually answered.
///
/// `cancellation_token` is checked before every attempt dispatches (and while
/// waiting on the rate limiter): once cancelled, no further attempt reaches
/// the provider — each one short-circuits to a `cancelled` `CallError`,
/// which C3/C4 already treat as neither retryable nor fallback-recoverable.
#[allow(clippy::too_many_arguments)]
pub async fn execute(
    client: &LlmClient,
    registry: &ModelRegistry,
    rate_limiter: &RateLimiter,
    model_id: &str,
    system: &str,
    user_text: &str,
    image: Option<ImageData>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
    call_timeout: Duration,
    retry_max_attempts: u32,
    retry_initial_delay: f64,
    cancellation_token: &CancellationToken,
) -> Result<(String, String), CallError> {
    call_with_fallback(
        registry,
        model_id,
        retry_max_attempts,
        retry_initial_delay,
        |spec| {
            let image = image.clone();
            async move {
                if cancellation_token.is_cancelled() {
                    return Err(CallError::new(
                        ErrorKind::Cancelled,
                        spec.model_id.clone(),
                        "cancellation observed before dispatching call",
                    ));
                }
                if !rate_limiter.acquire_cancellable(cancellation_token).await {
                    return Err(CallError::new(
                        ErrorKind::Cancelled,
                        spec.model_id.clone(),
                        "cancelled while waiting for the rate limiter",
                    ));
                }
                client
                    .complete(
                        &spec,
                        system,
                        user_text,
                        image,
                        temperature,
                        max_tokens,
                        response_format,
                        call_timeout,
                    )
                    .await
            }
        },
    )
    .await
}
