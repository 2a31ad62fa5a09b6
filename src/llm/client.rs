//! C1 — the LLM Client: a thin wrapper around `edgequake_llm::LLMProvider`
//! that resolves a model id to a provider, issues one chat call, and
//! classifies every failure into the ten-way [`crate::error::ErrorKind`]
//! taxonomy.
//!
//! `edgequake_llm::LlmError`'s variants are not visible to this crate (it is
//! an external dependency), so classification inspects the error's rendered
//! message for well-known substrings — the same heuristic a direct HTTP
//! client would need if the provider SDK surfaced only a string.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory,
    ResponseFormat as ProviderResponseFormat,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{CallError, ErrorKind};
use crate::model::LlmModelSpec;

/// Requested response shape for one call. `JsonObject` asks the provider for
/// its native JSON response mode so the model is constrained at the API
/// level rather than by prompt wording alone; `FreeText` leaves the response
/// unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    FreeText,
    JsonObject,
}

/// Resolves model ids to provider handles and performs the underlying chat
/// call. One `LlmClient` is shared (behind an `Arc`) across every page task
/// in a run; provider handles are created lazily and cached so a model that
/// is never actually routed to never demands its credential.
pub struct LlmClient {
    providers: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-populate the provider cache for `model_id` with an already-built
    /// provider, bypassing `ProviderFactory`. Used by tests (and any caller
    /// that constructs its own provider ahead of time) to exercise the
    /// retry/fallback/rate-limit machinery without a live credential.
    pub async fn insert_provider(&self, model_id: impl Into<String>, provider: Arc<dyn LLMProvider>) {
        self.providers.lock().await.insert(model_id.into(), provider);
    }

    async fn provider_for(&self, spec: &LlmModelSpec) -> Result<Arc<dyn LLMProvider>, CallError> {
        let mut providers = self.providers.lock().await;
        if let Some(p) = providers.get(&spec.model_id) {
            return Ok(Arc::clone(p));
        }
        let provider = ProviderFactory::create_llm_provider(&spec.provider, &spec.model_id)
            .map_err(|e| {
                CallError::new(
                    ErrorKind::AuthFailure,
                    spec.model_id.clone(),
                    format!("failed to construct provider '{}': {e}", spec.provider),
                )
            })?;
        providers.insert(spec.model_id.clone(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Issue one chat completion call: `system` + page text, optionally with
    /// an image attached (vision strategies only). `response_format` asks the
    /// provider for its native JSON mode when set to `JsonObject`, rather
    /// than relying on prompt wording alone. `timeout` bounds the whole call;
    /// a timeout is classified `transient_http` so C3 retries it.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete(
        &self,
        spec: &LlmModelSpec,
        system: &str,
        user_text: &str,
        image: Option<ImageData>,
        temperature: f32,
        max_tokens: u32,
        response_format: ResponseFormat,
        timeout: Duration,
    ) -> Result<String, CallError> {
        let provider = self.provider_for(spec).await?;

        let messages = vec![
            ChatMessage::system(system),
            match image {
                Some(img) => ChatMessage::user_with_images(user_text, vec![img]),
                None => ChatMessage::user_with_images(user_text, vec![]),
            },
        ];

        let options = CompletionOptions {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            response_format: match response_format {
                ResponseFormat::JsonObject => Some(ProviderResponseFormat::JsonObject),
                ResponseFormat::FreeText => None,
            },
            ..Default::default()
        };

        let call = provider.chat(&messages, Some(&options));
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => Err(classify_error(&spec.model_id, &e)),
            Err(_) => Err(CallError::new(
                ErrorKind::TransientHttp,
                spec.model_id.clone(),
                format!("call timed out after {timeout:?}"),
            )),
        }
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify a provider-reported failure into the ten-way taxonomy using
/// substring matches against its rendered message. Ordered most-specific
/// first; unmatched errors fall through to `terminal_other`.
pub fn classify_error(model_id: &str, err: &dyn std::fmt::Display) -> CallError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();

    let kind = if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        ErrorKind::RateLimited
    } else if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") || lower.contains("api key") || lower.contains("forbidden") {
        ErrorKind::AuthFailure
    } else if lower.contains("content filter") || lower.contains("content policy") || lower.contains("safety") {
        ErrorKind::ContentPolicy
    } else if lower.contains("400") || lower.contains("422") || lower.contains("invalid request") || lower.contains("too large") || lower.contains("context length") {
        ErrorKind::InvalidRequest
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection reset")
        || lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("internal server error")
        || lower.contains("bad gateway")
        || lower.contains("service unavailable")
        || lower.contains("gateway timeout")
    {
        ErrorKind::TransientHttp
    } else if lower.contains("cancel") {
        ErrorKind::Cancelled
    } else {
        warn!(model = model_id, error = %msg, "unclassified LLM call failure, treating as terminal_other");
        ErrorKind::TerminalOther
    };

    CallError::new(kind, model_id, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit() {
        let e = classify_error("gpt-4.1-nano", &"HTTP 429 Too Many Requests");
        assert_eq!(e.kind, ErrorKind::RateLimited);
    }

    #[test]
    fn classifies_auth_failure() {
        let e = classify_error("gpt-4.1-nano", &"401 Unauthorized: invalid api key");
        assert_eq!(e.kind, ErrorKind::AuthFailure);
    }

    #[test]
    fn classifies_content_policy() {
        let e = classify_error("gpt-4.1-nano", &"response blocked by content filter");
        assert_eq!(e.kind, ErrorKind::ContentPolicy);
    }

    #[test]
    fn classifies_timeout_as_transient() {
        let e = classify_error("gpt-4.1-nano", &"request timed out after 60s");
        assert_eq!(e.kind, ErrorKind::TransientHttp);
    }

    #[test]
    fn classifies_generic_5xx_as_transient() {
        for msg in [
            "500 Internal Server Error",
            "501 Not Implemented",
            "505 HTTP Version Not Supported",
            "Bad Gateway",
            "Service Unavailable",
            "Gateway Timeout",
        ] {
            let e = classify_error("gpt-4.1-nano", &msg);
            assert_eq!(e.kind, ErrorKind::TransientHttp, "{msg} should classify as transient_http");
        }
    }

    #[test]
    fn unrecognized_message_is_terminal_other() {
        let e = classify_error("gpt-4.1-nano", &"the model exploded mysteriously");
        assert_eq!(e.kind, ErrorKind::TerminalOther);
    }
}
