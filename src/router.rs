//! C5 — the Router: one vision-LLM call per page that classifies its
//! complexity and recommends which extraction strategies to run, turned
//! into an ordered [`ExtractionPlan`].
//!
//! Tie-break rules (applied after parsing, regardless of what the model
//! recommended):
//! - zero recommendations on a page with non-trivial content → append a
//!   `comprehensive` step so no page is ever skipped entirely;
//! - more than four recommendations → truncate to the first four, in the
//!   model's own preference order;
//! - `simple` complexity → force a single `minimal` step, overriding
//!   whatever the model recommended (cheapest pass suffices).
//!
//! A parse failure (malformed JSON, or the call itself exhausting its
//! fallback chain) never aborts the page: it produces a default single-step
//! `comprehensive` plan marked `is_fallback_plan`.

use std::time::Duration;

use edgequake_llm::ImageData;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ModelRegistry;
use crate::error::CallError;
use crate::llm::client::{LlmClient, ResponseFormat};
use crate::llm::rate_limiter::RateLimiter;
use crate::model::{ExtractionPlan, ExtractionStep, ExtractionStrategy, PageComplexity, PageInput, RouterAnalysis};
use crate::prompts::ROUTER_SYSTEM_PROMPT;

const MAX_RECOMMENDED_STRATEGIES: usize = 4;

/// Produce an extraction plan for one page. Never returns `Err`: routing
/// failures degrade to a fallback plan rather than aborting the page, so the
/// Extractor always has something to run.
#[allow(clippy::too_many_arguments)]
pub async fn route_page(
    page: &PageInput,
    client: &LlmClient,
    registry: &ModelRegistry,
    rate_limiter: &RateLimiter,
    model_id: &str,
    call_timeout: Duration,
    retry_max_attempts: u32,
    retry_initial_delay: f64,
    cancellation_token: &CancellationToken,
) -> ExtractionPlan {
    let image = ImageData::new(page.image_base64.clone(), "image/png").with_detail("high");

    let result = crate::llm::execute(
        client,
        registry,
        rate_limiter,
        model_id,
        ROUTER_SYSTEM_PROMPT,
        &page.text,
        Some(image),
        0.0,
        1024,
        ResponseFormat::JsonObject,
        call_timeout,
        retry_max_attempts,
        retry_initial_delay,
        cancellation_token,
    )
    .await;

    match result {
        Ok((raw, _model_used)) => match parse_analysis(&raw) {
            Some(analysis) => analysis_to_plan(page.page_index, analysis),
            None => {
                warn!(page = page.page_index, "router response unparseable, using fallback plan");
                fallback_plan(page.page_index)
            }
        },
        Err(e) => {
            warn!(page = page.page_index, error = %e, "router call failed, using fallback plan");
            fallback_plan(page.page_index)
        }
    }
}

fn parse_analysis(raw: &str) -> Option<RouterAnalysis> {
    let repaired = crate::strategy::repair_json(raw)?;
    serde_json::from_str(&repaired).ok()
}

fn fallback_plan(page_index: usize) -> ExtractionPlan {
    ExtractionPlan {
        page_index,
        steps: vec![ExtractionStep {
            step_number: 1,
            strategy: ExtractionStrategy::Comprehensive,
            rationale: "router unavailable, defaulting to comprehensive extraction".into(),
            is_fallback: true,
        }],
        is_fallback_plan: true,
        page_complexity: PageComplexity::Moderate,
    }
}

fn analysis_to_plan(page_index: usize, analysis: RouterAnalysis) -> ExtractionPlan {
    if analysis.page_complexity == PageComplexity::Simple {
        return ExtractionPlan {
            page_index,
            steps: vec![ExtractionStep {
                step_number: 1,
                strategy: ExtractionStrategy::Minimal,
                rationale: "page classified as simple".into(),
                is_fallback: false,
            }],
            is_fallback_plan: false,
            page_complexity: PageComplexity::Simple,
        };
    }

    let mut strategies: Vec<ExtractionStrategy> = analysis
        .recommended_strategies
        .iter()
        .filter_map(|id| {
            let strategy = ExtractionStrategy::from_id(id);
            if strategy.is_none() {
                warn!(page = page_index, strategy_id = %id, "dropping unknown strategy id recommended by the router");
            }
            strategy
        })
        .collect();
    strategies.dedup();

    let has_content = analysis.tables.estimate() > 0
        || analysis.charts.estimate() > 0
        || analysis.dense_text.estimate() > 0
        || analysis.page_complexity != PageComplexity::Simple;

    if strategies.is_empty() && has_content {
        strategies.push(ExtractionStrategy::Comprehensive);
    }

    if strategies.len() > MAX_RECOMMENDED_STRATEGIES {
        strategies.truncate(MAX_RECOMMENDED_STRATEGIES);
    }

    if strategies.is_empty() {
        strategies.push(ExtractionStrategy::Minimal);
    }

    let steps = strategies
        .into_iter()
        .enumerate()
        .map(|(i, strategy)| ExtractionStep {
            step_number: (i + 1) as u32,
            strategy,
            rationale: format!("router recommended {} for {:?} page", strategy.id(), analysis.page_complexity),
            is_fallback: false,
        })
        .collect();

    ExtractionPlan {
        page_index,
        steps,
        is_fallback_plan: false,
        page_complexity: analysis.page_complexity,
    }
}
