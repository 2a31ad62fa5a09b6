//! C7 — the Extractor: executes an [`ExtractionPlan`]'s steps sequentially
//! against one page, each step gated by the shared rate limiter and wrapped
//! in retry + fallback (C2 through C4). Steps never run concurrently with
//! each other — only pages are concurrent, bounded by the Orchestrator's
//! semaphore — since later steps (refinement) need earlier ones' outcome.
//!
//! A failed step is recorded as `success: false` and the plan continues;
//! one bad strategy never aborts the rest of the page.

use std::time::{Duration, Instant};

use edgequake_llm::ImageData;
use tokio_util::sync::CancellationToken;

use crate::config::ModelRegistry;
use crate::llm::client::{LlmClient, ResponseFormat};
use crate::llm::rate_limiter::RateLimiter;
use crate::model::{ExtractionContent, ExtractionPlan, ExtractionResult, PageInput};
use crate::progress::ProgressCallback;
use crate::strategy;

#[allow(clippy::too_many_arguments)]
pub async fn run_plan(
    page: &PageInput,
    plan: &ExtractionPlan,
    client: &LlmClient,
    registry: &ModelRegistry,
    rate_limiter: &RateLimiter,
    model_id: &str,
    call_timeout: Duration,
    retry_max_attempts: u32,
    retry_initial_delay: f64,
    progress: Option<&ProgressCallback>,
    cancellation_token: &CancellationToken,
) -> Vec<ExtractionResult> {
    let mut results = Vec::with_capacity(plan.steps.len());

    for step in &plan.steps {
        if let Some(cb) = progress {
            cb.on_extraction_step_start(page.page_index, step.step_number, step.strategy.id());
        }

        let result = run_step(
            page,
            step.step_number,
            step.strategy,
            client,
            registry,
            rate_limiter,
            model_id,
            call_timeout,
            retry_max_attempts,
            retry_initial_delay,
            cancellation_token,
        )
        .await;

        if let Some(cb) = progress {
            cb.on_extraction_step_complete(page.page_index, step.step_number, result.success);
        }

        results.push(result);
    }

    results
}

#[allow(clippy::too_many_arguments)]
async fn run_step(
    page: &PageInput,
    step_number: u32,
    strategy_kind: crate::model::ExtractionStrategy,
    client: &LlmClient,
    registry: &ModelRegistry,
    rate_limiter: &RateLimiter,
    model_id: &str,
    call_timeout: Duration,
    retry_max_attempts: u32,
    retry_initial_delay: f64,
    cancellation_token: &CancellationToken,
) -> ExtractionResult {
    let started = Instant::now();
    let strategy = strategy::for_strategy(strategy_kind);

    let image = if strategy.needs_image() {
        Some(ImageData::new(page.image_base64.clone(), "image/png").with_detail("high"))
    } else {
        None
    };

    let system = strategy.system_prompt();
    let user_text = strategy::user_text(page);

    let call = crate::llm::execute(
        client,
        registry,
        rate_limiter,
        model_id,
        &system,
        &user_text,
        image,
        0.2,
        2048,
        ResponseFormat::JsonObject,
        call_timeout,
        retry_max_attempts,
        retry_initial_delay,
        cancellation_token,
    )
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;

    match call {
        Ok((raw, model_used)) => match strategy.parse(&raw) {
            Some(content) => ExtractionResult {
                step_number,
                strategy: strategy_kind,
                success: true,
                content,
                error: None,
                model_used,
                elapsed_ms,
            },
            None => ExtractionResult {
                step_number,
                strategy: strategy_kind,
                success: false,
                content: ExtractionContent::default(),
                error: Some("response could not be parsed as structured content".into()),
                model_used,
                elapsed_ms,
            },
        },
        Err(e) => ExtractionResult {
            step_number,
            strategy: strategy_kind,
            success: false,
            content: ExtractionContent::default(),
            error: Some(e.to_string()),
            model_used: e.model,
            elapsed_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractionPlan, ExtractionStep, ExtractionStrategy};

    fn page() -> PageInput {
        PageInput {
            page_index: 0,
            page_width: 100,
            page_height: 100,
            image_base64: "zz".into(),
            text: "hello world".into(),
        }
    }

    #[test]
    fn plan_with_zero_steps_runs_to_empty_result_shape() {
        let plan = ExtractionPlan {
            page_index: 0,
            steps: Vec::<ExtractionStep>::new(),
            is_fallback_plan: false,
            page_complexity: crate::model::PageComplexity::Moderate,
        };
        assert!(plan.steps.is_empty());
        let _ = page();
        let _ = ExtractionStrategy::Minimal;
    }
}
