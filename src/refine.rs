//! C9 — the Refinement Analyzer: after a page's plan has run, optionally
//! asks the LLM whether the merged extraction still misses material content
//! and, if so, schedules a bounded number of additional steps.
//!
//! Refinement is skipped outright when disabled, or once
//! `max_refinement_cycles` has been reached. An unparseable verdict, or a
//! verdict reporting nothing missing, ends the loop for that page — the
//! same "degrade gracefully, never hold up the rest of the document" rule
//! the Router follows.
//!
//! Resolved design decision: a `(strategy, missing_aspect)` pair is never
//! retried once attempted for a page, even across cycles — without this,
//! a model that keeps citing the same gap would loop until the cycle cap
//! regardless of whether the added steps actually help.

use std::collections::HashSet;
use std::time::Duration;

use edgequake_llm::ImageData;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ModelRegistry;
use crate::llm::client::{LlmClient, ResponseFormat};
use crate::llm::rate_limiter::RateLimiter;
use crate::model::{ExtractionStrategy, PageInput, PageResult};
use crate::prompts::REFINEMENT_SYSTEM_PROMPT;

#[derive(Debug, Clone, Default, Deserialize)]
struct RefinementVerdict {
    #[serde(default)]
    needs_refinement: bool,
    #[serde(default)]
    missing_aspects: Vec<String>,
    #[serde(default)]
    recommended_strategies: Vec<String>,
}

/// Tracks `(strategy, missing_aspect)` pairs already attempted for one page,
/// across every refinement cycle, so the same gap is never re-scheduled.
pub type AttemptedGaps = HashSet<(ExtractionStrategy, String)>;

/// `false` means the caller should stop refining without spending an LLM
/// call at all — the cheapest possible check, done before anything else.
pub fn should_attempt(cycle: u32, iterative_refinement_enabled: bool, max_refinement_cycles: u32) -> bool {
    iterative_refinement_enabled && cycle < max_refinement_cycles
}

/// Ask the LLM whether `merged` still misses material content, and if so,
/// produce the bounded set of new `(strategy, rationale)` steps to run next.
/// Returns an empty vec when no refinement is needed, the call failed, or
/// the response was unparseable — in every case the page's current result
/// stands as final.
#[allow(clippy::too_many_arguments)]
pub async fn evaluate(
    page: &PageInput,
    merged: &PageResult,
    attempted: &mut AttemptedGaps,
    client: &LlmClient,
    registry: &ModelRegistry,
    rate_limiter: &RateLimiter,
    model_id: &str,
    call_timeout: Duration,
    retry_max_attempts: u32,
    retry_initial_delay: f64,
    cancellation_token: &CancellationToken,
) -> Vec<(ExtractionStrategy, String)> {
    let image = ImageData::new(page.image_base64.clone(), "image/png").with_detail("high");
    let summary = serde_json::json!({
        "main_title": merged.main_title,
        "page_summary": merged.page_summary,
        "key_section_titles": merged.key_sections.iter().map(|s| s.section_title.clone()).collect::<Vec<_>>(),
        "visual_element_types": merged.visual_elements.iter().map(|v| v.element_type.clone()).collect::<Vec<_>>(),
    })
    .to_string();

    let call = crate::llm::execute(
        client,
        registry,
        rate_limiter,
        model_id,
        REFINEMENT_SYSTEM_PROMPT,
        &summary,
        Some(image),
        0.0,
        512,
        ResponseFormat::JsonObject,
        call_timeout,
        retry_max_attempts,
        retry_initial_delay,
        cancellation_token,
    )
    .await;

    let raw = match call {
        Ok((raw, _model_used)) => raw,
        Err(e) => {
            warn!(page = page.page_index, error = %e, "refinement call failed, keeping current extraction");
            return Vec::new();
        }
    };

    let verdict = match parse_verdict(&raw) {
        Some(v) => v,
        None => {
            warn!(page = page.page_index, "refinement response unparseable, keeping current extraction");
            return Vec::new();
        }
    };

    if !verdict.needs_refinement {
        return Vec::new();
    }

    plan_additional_steps(&verdict, attempted, merged.total_steps)
}

fn parse_verdict(raw: &str) -> Option<RefinementVerdict> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }
    let repaired = crate::strategy::repair_json(raw)?;
    serde_json::from_str(&repaired).ok()
}

fn plan_additional_steps(
    verdict: &RefinementVerdict,
    attempted: &mut AttemptedGaps,
    total_steps_so_far: usize,
) -> Vec<(ExtractionStrategy, String)> {
    let budget = (4usize.saturating_sub(total_steps_so_far)).max(1);

    let mut additions = Vec::new();
    for (i, strategy_id) in verdict.recommended_strategies.iter().enumerate() {
        let Some(strategy) = ExtractionStrategy::from_id(strategy_id) else {
            continue;
        };
        let aspect = verdict
            .missing_aspects
            .get(i)
            .cloned()
            .unwrap_or_else(|| "unspecified gap".to_string());
        let key = (strategy, aspect.trim().to_lowercase());
        if attempted.contains(&key) {
            continue;
        }
        attempted.insert(key);
        additions.push((strategy, format!("refinement: {aspect}")));
        if additions.len() >= budget {
            break;
        }
    }
    additions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(strategies: &[&str], aspects: &[&str]) -> RefinementVerdict {
        RefinementVerdict {
            needs_refinement: true,
            missing_aspects: aspects.iter().map(|s| s.to_string()).collect(),
            recommended_strategies: strategies.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn should_attempt_respects_flag_and_cycle_cap() {
        assert!(!should_attempt(0, false, 2));
        assert!(should_attempt(0, true, 2));
        assert!(should_attempt(1, true, 2));
        assert!(!should_attempt(2, true, 2));
    }

    #[test]
    fn same_gap_is_never_scheduled_twice() {
        let mut attempted = AttemptedGaps::new();
        let v = verdict(&["visual"], &["missing chart"]);
        let first = plan_additional_steps(&v, &mut attempted, 2);
        assert_eq!(first.len(), 1);
        let second = plan_additional_steps(&v, &mut attempted, 3);
        assert!(second.is_empty());
    }

    #[test]
    fn bounds_new_steps_to_four_minus_existing() {
        let mut attempted = AttemptedGaps::new();
        let v = verdict(
            &["visual", "table_focused", "basic", "comprehensive"],
            &["a", "b", "c", "d"],
        );
        let additions = plan_additional_steps(&v, &mut attempted, 3);
        assert_eq!(additions.len(), 1);
    }

    #[test]
    fn unknown_strategy_ids_in_verdict_are_skipped() {
        let mut attempted = AttemptedGaps::new();
        let v = verdict(&["not_real"], &["something"]);
        let additions = plan_additional_steps(&v, &mut attempted, 1);
        assert!(additions.is_empty());
    }
}
