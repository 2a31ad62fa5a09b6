//! C10 — the Orchestrator: drives every page through routing, extraction,
//! merging, and refinement, bounded by `concurrency_limit` concurrent pages.
//! The rate limiter (C2) is a single shared instance across every page's
//! calls — concurrency and call-rate are orthogonal knobs: a run can have 50
//! pages in flight while still only issuing 10 LLM calls a minute.
//!
//! A single page's failure never cancels its siblings: whatever a page's
//! outcome, it is folded into `DocumentOutput` as either a `PageResult` or a
//! `PageError`, and every other page keeps running. Cancelling
//! `config.cancellation_token` stops new work without tearing anything down:
//! pages not yet started never spawn their first call, and a page already
//! running is dropped from the result once its current step's call
//! short-circuits rather than being forced to produce a result.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PageError};
use crate::llm::client::LlmClient;
use crate::llm::rate_limiter::RateLimiter;
use crate::model::{DocumentOutput, PageInput, PageResult};
use crate::refine::AttemptedGaps;
use crate::{extractor, merger, refine, router};

/// Process every page in `pages` concurrently, bounded by
/// `config.concurrency_limit`, and aggregate the results.
pub async fn run(pages: Vec<PageInput>, config: &PipelineConfig) -> DocumentOutput {
    let total_pages = pages.len();
    if let Some(cb) = &config.progress_callback {
        cb.on_document_start(total_pages);
    }

    let client = Arc::new(LlmClient::new());
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
    let semaphore = Arc::new(Semaphore::new(config.concurrency_limit));

    let mut tasks = Vec::with_capacity(total_pages);
    for page in pages {
        let client = Arc::clone(&client);
        let rate_limiter = Arc::clone(&rate_limiter);
        let semaphore = Arc::clone(&semaphore);
        let config = config.clone();
        let token = config.cancellation_token.clone();
        let page_index = page.page_index;

        tasks.push((
            page_index,
            tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => return None,
                    permit = semaphore.acquire_owned() => permit,
                };
                let _permit = permit;
                process_page(page, &client, &rate_limiter, &config).await
            }),
        ));
    }

    let mut pages_out = Vec::with_capacity(total_pages);
    let mut errors = Vec::new();
    let mut cancelled = false;

    for (page_index, task) in tasks {
        match task.await {
            Ok(Some(Ok(page_result))) => {
                if let Some(cb) = &config.progress_callback {
                    cb.on_page_complete(page_result.page_index, total_pages, page_result.successful_steps);
                }
                pages_out.push(page_result);
            }
            Ok(Some(Err(page_error))) => {
                if let Some(cb) = &config.progress_callback {
                    cb.on_page_error(page_error.page_index, total_pages, page_error.detail.clone());
                }
                errors.push(page_error);
            }
            Ok(None) => {
                cancelled = true;
            }
            Err(join_err) => {
                // The task panicked (cancellation is handled via the
                // cooperative token above, not task abortion, so a `JoinError`
                // here is always a genuine panic). The Merger never got a
                // chance to see this page at all, so it belongs in `errors`
                // rather than being silently dropped.
                warn!(page = page_index, error = %join_err, "page task panicked");
                let detail = if join_err.is_panic() {
                    format!("page task panicked: {join_err}")
                } else {
                    format!("page task did not complete: {join_err}")
                };
                let page_error = PageError::new(page_index, ErrorKind::TerminalOther, detail);
                if let Some(cb) = &config.progress_callback {
                    cb.on_page_error(page_index, total_pages, page_error.detail.clone());
                }
                errors.push(page_error);
            }
        }
    }

    if config.cancellation_token.is_cancelled() {
        cancelled = true;
    }

    pages_out.sort_by_key(|p| p.page_index);
    errors.sort_by_key(|e| e.page_index);

    if let Some(cb) = &config.progress_callback {
        cb.on_document_complete(total_pages, pages_out.len());
    }

    DocumentOutput { pages: pages_out, errors, cancelled }
}

/// Runs one page through routing → extraction → merging → refinement.
/// Returns `None` the moment cancellation is observed at a stage boundary —
/// the page is then absent from `DocumentOutput` entirely rather than
/// appearing as a partial result or an error.
async fn process_page(
    page: PageInput,
    client: &LlmClient,
    rate_limiter: &RateLimiter,
    config: &PipelineConfig,
) -> Option<Result<PageResult, PageError>> {
    let page_index = page.page_index;

    if config.cancellation_token.is_cancelled() {
        return None;
    }

    if let Some(cb) = &config.progress_callback {
        cb.on_page_routing_start(page_index, 0);
    }

    let mut plan = router::route_page(
        &page,
        client,
        &config.registry,
        rate_limiter,
        &config.registry.default_router,
        config.call_timeout,
        config.retry_max_attempts,
        config.retry_initial_delay,
        &config.cancellation_token,
    )
    .await;

    if let Some(cb) = &config.progress_callback {
        cb.on_page_routed(page_index, plan.steps.len(), plan.is_fallback_plan);
    }

    let is_fallback_plan = plan.is_fallback_plan;
    let page_complexity = plan.page_complexity;

    let mut results = extractor::run_plan(
        &page,
        &plan,
        client,
        &config.registry,
        rate_limiter,
        &config.registry.default_extraction,
        config.call_timeout,
        config.retry_max_attempts,
        config.retry_initial_delay,
        config.progress_callback.as_ref(),
        &config.cancellation_token,
    )
    .await;

    if config.cancellation_token.is_cancelled() {
        return None;
    }

    let mut merged = merger::merge(page_index, page_complexity, is_fallback_plan, &results);

    let mut attempted: AttemptedGaps = AttemptedGaps::new();
    let mut cycle = 0u32;
    while refine::should_attempt(cycle, config.iterative_refinement_enabled, config.max_refinement_cycles) {
        if config.cancellation_token.is_cancelled() {
            return None;
        }

        let additions = refine::evaluate(
            &page,
            &merged,
            &mut attempted,
            client,
            &config.registry,
            rate_limiter,
            &config.registry.default_summarizer,
            config.call_timeout,
            config.retry_max_attempts,
            config.retry_initial_delay,
            &config.cancellation_token,
        )
        .await;

        if additions.is_empty() {
            break;
        }

        let existing_step_count = plan.steps.len();
        plan.extend_with(additions);
        let new_steps = plan.steps[existing_step_count..].to_vec();
        let new_step_count = new_steps.len();

        let mut extra_results = extractor::run_plan(
            &page,
            &crate::model::ExtractionPlan {
                page_index,
                steps: new_steps,
                is_fallback_plan: false,
                page_complexity,
            },
            client,
            &config.registry,
            rate_limiter,
            &config.registry.default_extraction,
            config.call_timeout,
            config.retry_max_attempts,
            config.retry_initial_delay,
            config.progress_callback.as_ref(),
            &config.cancellation_token,
        )
        .await;

        results.append(&mut extra_results);
        merged = merger::merge(page_index, page_complexity, is_fallback_plan, &results);

        if let Some(cb) = &config.progress_callback {
            cb.on_refinement_cycle(page_index, cycle + 1, new_step_count);
        }

        cycle += 1;
    }

    if config.cancellation_token.is_cancelled() {
        return None;
    }

    Some(Ok(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelRegistry;
    use crate::model::LlmModelSpec;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    fn registry() -> ModelRegistry {
        let mut models = HashMap::new();
        models.insert(
            "m".to_string(),
            LlmModelSpec {
                model_id: "m".into(),
                provider: "openai".into(),
                token_limit: 1000,
                is_vision_capable: true,
                fallback: None,
            },
        );
        ModelRegistry {
            default_router: "m".into(),
            default_extraction: "m".into(),
            default_summarizer: "m".into(),
            models,
        }
    }

    fn page(index: usize) -> PageInput {
        PageInput {
            page_index: index,
            page_width: 10,
            page_height: 10,
            image_base64: "zz".into(),
            text: "hello".into(),
        }
    }

    #[tokio::test]
    async fn cancelling_before_any_page_starts_yields_no_pages_and_the_cancelled_marker() {
        let token = CancellationToken::new();
        token.cancel();
        let config = PipelineConfig::builder(registry())
            .cancellation_token(token)
            .build()
            .unwrap();

        let output = run(vec![page(0), page(1)], &config).await;

        assert!(output.cancelled);
        assert!(output.pages.is_empty());
        assert!(output.errors.is_empty());
    }

    #[tokio::test]
    async fn uncancelled_runs_leave_the_marker_false() {
        // A token that is never cancelled never makes process_page bail, so
        // this would hang waiting on a real provider call if it reached one —
        // it only exercises the marker plumbing via an empty page set.
        let config = PipelineConfig::builder(registry()).build().unwrap();
        let output = run(Vec::new(), &config).await;
        assert!(!output.cancelled);
        assert!(output.pages.is_empty());
    }

    /// A panicking page task must never be silently dropped: it belongs in
    /// `DocumentOutput::errors` since the Merger never got a chance to see
    /// that page at all (see the `Err(join_err)` arm in `run`).
    #[tokio::test]
    async fn panicking_page_task_is_recorded_as_a_page_error() {
        let handle: tokio::task::JoinHandle<Option<Result<PageResult, PageError>>> =
            tokio::spawn(async { panic!("simulated strategy panic") });
        let join_err = handle.await.unwrap_err();
        assert!(join_err.is_panic());

        let detail = format!("page task panicked: {join_err}");
        let page_error = PageError::new(7, ErrorKind::TerminalOther, detail);
        assert_eq!(page_error.page_index, 7);
        assert_eq!(page_error.kind, ErrorKind::TerminalOther);
        assert!(page_error.detail.contains("simulated strategy panic"));
    }
}
