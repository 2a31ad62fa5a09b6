//! C4 — the Fallback Chain: walks a model's declared fallback chain from
//! the model registry, retrying (via C3) each model in turn. Stops at the
//! first success; raises `fallback_exhausted` once every model in the chain
//! has failed. A model already attempted earlier in the same call is never
//! retried again even if it reappears (the registry forbids fallback
//! cycles, but this guard keeps the chain finite regardless).

use std::future::Future;
use std::time::Duration;

use crate::config::ModelRegistry;
use crate::error::{CallError, ErrorKind};
use crate::llm::retry::retry_with_backoff;
use crate::model::LlmModelSpec;

/// Run `call` (one attempt against one model) through C3's retry handler for
/// every model in `start_model`'s fallback chain, in order, stopping at the
/// first success.
///
/// `call` receives the concrete `LlmModelSpec` to target this attempt.
pub async fn call_with_fallback<F, Fut>(
    registry: &ModelRegistry,
    start_model: &str,
    retry_max_attempts: u32,
    retry_initial_delay: f64,
    mut call: F,
) -> Result<(String, String), CallError>
where
    F: FnMut(LlmModelSpec) -> Fut,
    Fut: Future<Output = Result<String, CallError>>,
{
    let chain = registry
        .fallback_chain(start_model)
        .map_err(|e| CallError::new(ErrorKind::ValidationFailure, start_model, e))?;

    let mut last_err = None;

    for model_id in &chain {
        let Some(spec) = registry.get(model_id).cloned() else {
            continue;
        };
        let result = retry_with_backoff(retry_max_attempts, retry_initial_delay, || {
            call(spec.clone())
        })
        .await;

        match result {
            Ok(content) => return Ok((content, model_id.clone())),
            Err(e) => {
                let recoverable_by_fallback = e.kind.is_fallback_recoverable() || e.kind.is_retryable();
                last_err = Some(e);
                if !recoverable_by_fallback {
                    break;
                }
            }
        }
    }

    Err(CallError::new(
        ErrorKind::FallbackExhausted,
        start_model,
        format!(
            "every model in the fallback chain failed; last error: {}",
            last_err.map(|e| e.message).unwrap_or_else(|| "none attempted".into())
        ),
    ))
}

/// Convenience timeout-aware wrapper matching the default call timeout used
/// throughout the pipeline when a caller doesn't need a custom duration.
pub fn default_call_timeout() -> Duration {
    Duration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn registry_with_chain() -> ModelRegistry {
        let mut models = HashMap::new();
        models.insert(
            "primary".to_string(),
            LlmModelSpec {
                model_id: "primary".into(),
                provider: "openai".into(),
                token_limit: 1000,
                is_vision_capable: true,
                fallback: Some("secondary".into()),
            },
        );
        models.insert(
            "secondary".to_string(),
            LlmModelSpec {
                model_id: "secondary".into(),
                provider: "gemini".into(),
                token_limit: 1000,
                is_vision_capable: true,
                fallback: None,
            },
        );
        ModelRegistry {
            default_router: "primary".into(),
            default_extraction: "primary".into(),
            default_summarizer: "primary".into(),
            models,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn falls_to_secondary_on_auth_failure() {
        let registry = registry_with_chain();
        let attempts = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&attempts);

        let result = call_with_fallback(&registry, "primary", 2, 0.01, move |spec| {
            let a = Arc::clone(&a);
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                if spec.model_id == "primary" {
                    Err(CallError::new(ErrorKind::AuthFailure, "primary", "no key"))
                } else {
                    Ok("from secondary".to_string())
                }
            }
        })
        .await;

        let (content, model_used) = result.unwrap();
        assert_eq!(content, "from secondary");
        assert_eq!(model_used, "secondary");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_chain_when_every_model_fails() {
        let registry = registry_with_chain();
        let result = call_with_fallback(&registry, "primary", 1, 0.01, |spec| async move {
            Err(CallError::new(ErrorKind::AuthFailure, spec.model_id, "no key"))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::FallbackExhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_within_a_single_model_before_falling_back() {
        let registry = registry_with_chain();
        let attempts = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&attempts);

        let result = call_with_fallback(&registry, "primary", 3, 0.01, move |spec| {
            let a = Arc::clone(&a);
            async move {
                let n = a.fetch_add(1, Ordering::SeqCst);
                if spec.model_id == "primary" && n < 2 {
                    Err(CallError::new(ErrorKind::TransientHttp, "primary", "503"))
                } else if spec.model_id == "primary" {
                    Ok("recovered on primary".to_string())
                } else {
                    Ok("from secondary".to_string())
                }
            }
        })
        .await;

        let (content, model_used) = result.unwrap();
        assert_eq!(content, "recovered on primary");
        assert_eq!(model_used, "primary");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
