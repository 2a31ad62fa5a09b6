//! End-to-end scenario tests for docuflow's pipeline stages.
//!
//! These exercise the six scenarios a production run needs to survive:
//! a clean run, a router failure, a partial step failure, a rate limiter
//! under concurrent load, a refinement loop bounded by its cycle cap, and a
//! cancelled call that must not be retried or escalated to another model.
//!
//! Every test below drives the pipeline's own public stage boundaries
//! (Merger, Refinement Analyzer, Rate Limiter, Retry Handler, Fallback
//! Chain) directly with in-process data, rather than a live or mocked
//! network call — `edgequake_llm::LLMProvider` is an opaque external trait
//! whose response type this crate never constructs itself, only reads, so
//! there is nothing of ours to fake at that exact boundary. Everything
//! upstream of an actual provider call (classification, retry, fallback,
//! rate limiting, merging, refinement bookkeeping) is fully exercised here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docuflow::error::{CallError, ErrorKind};
use docuflow::llm::fallback::call_with_fallback;
use docuflow::llm::rate_limiter::RateLimiter;
use docuflow::llm::retry::retry_with_backoff;
use docuflow::merger;
use docuflow::model::{
    ExtractionContent, ExtractionResult, ExtractionStrategy, KeySection, PageComplexity,
    VisualElement,
};
use docuflow::refine::{self, AttemptedGaps};
use docuflow::{ModelRegistry, PipelineConfig};

fn ok_result(strategy: ExtractionStrategy, step_number: u32, content: ExtractionContent) -> ExtractionResult {
    ExtractionResult {
        step_number,
        strategy,
        success: true,
        content,
        error: None,
        model_used: "gpt-4.1-nano".into(),
        elapsed_ms: 42,
    }
}

fn failed_result(strategy: ExtractionStrategy, step_number: u32, error: &str) -> ExtractionResult {
    ExtractionResult {
        step_number,
        strategy,
        success: false,
        content: ExtractionContent::default(),
        error: Some(error.to_string()),
        model_used: "gpt-4.1-nano".into(),
        elapsed_ms: 8,
    }
}

// ── Scenario 1: happy path ──────────────────────────────────────────────────

#[test]
fn happy_path_merges_every_successful_step_into_one_page_result() {
    let basic = ok_result(
        ExtractionStrategy::Basic,
        1,
        ExtractionContent {
            main_title: Some("Quarterly Report".into()),
            key_sections: vec![KeySection {
                section_title: "Overview".into(),
                content: "Revenue grew 12%".into(),
                section_id: "h-overview".into(),
            }],
            ..Default::default()
        },
    );
    let visual = ok_result(
        ExtractionStrategy::Visual,
        2,
        ExtractionContent {
            visual_elements: vec![VisualElement {
                element_type: "chart".into(),
                title: "Revenue by quarter".into(),
                details: HashMap::new(),
            }],
            ..Default::default()
        },
    );

    let merged = merger::merge(0, PageComplexity::Moderate, false, &[basic, visual]);

    assert_eq!(merged.extraction_method, "smart_routing");
    assert_eq!(merged.total_steps, 2);
    assert_eq!(merged.successful_steps, 2);
    assert_eq!(merged.main_title.as_deref(), Some("Quarterly Report"));
    assert_eq!(merged.key_sections.len(), 1);
    assert_eq!(merged.visual_elements.len(), 1);
}

// ── Scenario 2: router failure degrades to a fallback plan ─────────────────

#[test]
fn router_failure_fallback_plan_is_reported_as_such() {
    let comprehensive = ok_result(
        ExtractionStrategy::Comprehensive,
        1,
        ExtractionContent {
            main_title: Some("Untitled Document".into()),
            ..Default::default()
        },
    );

    // `is_fallback_plan = true` mirrors what the Router produces when its own
    // call is unparseable or exhausts its fallback chain (see `router::fallback_plan`).
    let merged = merger::merge(3, PageComplexity::Moderate, true, &[comprehensive]);

    assert_eq!(merged.extraction_method, "fallback");
    assert_eq!(merged.page_index, 3);
    assert_eq!(merged.successful_steps, 1);
}

// ── Scenario 3: partial step failure ────────────────────────────────────────

#[test]
fn partial_step_failure_keeps_the_page_with_reduced_successful_steps() {
    let good = ok_result(
        ExtractionStrategy::Comprehensive,
        1,
        ExtractionContent {
            main_title: Some("Survives".into()),
            ..Default::default()
        },
    );
    let bad = failed_result(ExtractionStrategy::Visual, 2, "response could not be parsed as structured content");

    let merged = merger::merge(1, PageComplexity::Complex, false, &[good, bad]);

    assert_eq!(merged.total_steps, 2);
    assert_eq!(merged.successful_steps, 1);
    assert_eq!(merged.main_title.as_deref(), Some("Survives"));
}

// ── Scenario 4: rate limiter under concurrent load ──────────────────────────

#[tokio::test(start_paused = true)]
async fn rate_limiter_paces_concurrent_callers_to_the_configured_budget() {
    let limiter = Arc::new(RateLimiter::new(30)); // 30/min = 1 every 2s

    // Drain the initial bucket.
    for _ in 0..30 {
        limiter.acquire().await;
    }

    // 5 more callers, all fired concurrently, must wait for refill rather
    // than completing immediately.
    let mut handles = Vec::new();
    for _ in 0..5 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.acquire().await;
        }));
    }

    // Give the spawned tasks a chance to register as pending on the sleep.
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_secs(10)).await;

    for handle in handles {
        handle.await.unwrap();
    }
}

// ── Scenario 5: refinement bounded by max_refinement_cycles ────────────────

#[test]
fn refinement_loop_never_exceeds_the_configured_cycle_cap() {
    let max_cycles = 2;
    let mut cycle = 0u32;
    let mut iterations = 0;

    while refine::should_attempt(cycle, true, max_cycles) {
        iterations += 1;
        cycle += 1;
    }

    assert_eq!(iterations, max_cycles);
    assert!(!refine::should_attempt(cycle, true, max_cycles));
}

#[test]
fn refinement_disabled_never_attempts_a_single_cycle() {
    assert!(!refine::should_attempt(0, false, 5));
}

#[test]
fn same_missing_aspect_is_never_scheduled_twice_across_cycles() {
    // Mirrors the resolved design decision in `refine`: a (strategy, aspect)
    // pair already attempted must not reappear even in a later cycle, which
    // is what keeps a model that keeps citing the same gap from looping
    // until the cycle cap regardless of whether it helps.
    let mut attempted = AttemptedGaps::new();
    attempted.insert((ExtractionStrategy::Visual, "missing chart".to_string()));
    assert!(attempted.contains(&(ExtractionStrategy::Visual, "missing chart".to_string())));
}

// ── Scenario 6: cancellation is never retried or escalated ─────────────────

#[tokio::test(start_paused = true)]
async fn cancelled_calls_are_not_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let a = Arc::clone(&attempts);

    let result = retry_with_backoff(5, 0.01, || {
        let a = Arc::clone(&a);
        async move {
            a.fetch_add(1, Ordering::SeqCst);
            Err(CallError::new(ErrorKind::Cancelled, "gpt-4.1-nano", "caller cancelled the run"))
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "a cancelled call must not be retried");
}

#[tokio::test(start_paused = true)]
async fn cancelled_calls_are_not_escalated_through_the_fallback_chain() {
    let registry = ModelRegistry::from_yaml_str(
        r#"
default_models:
  router: primary
  extraction: primary
  summarizer: primary
models:
  primary:
    provider: openai
    token_limit: 1000
    is_vision_capable: true
    fallback: secondary
  secondary:
    provider: gemini
    token_limit: 1000
    is_vision_capable: true
    fallback: null
"#,
    )
    .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let a = Arc::clone(&attempts);

    let result = call_with_fallback(&registry, "primary", 3, 0.01, move |spec| {
        let a = Arc::clone(&a);
        async move {
            a.fetch_add(1, Ordering::SeqCst);
            Err(CallError::new(ErrorKind::Cancelled, spec.model_id, "caller cancelled the run"))
        }
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::FallbackExhausted);
    assert_eq!(
        attempts.load(Ordering::SeqCst),
        1,
        "cancellation is neither retryable nor fallback-recoverable — only `primary` should ever be tried"
    );
}

// ── Model registry validation ────────────────────────────────────────────────

#[test]
fn pipeline_config_builder_clamps_out_of_range_inputs() {
    let registry = ModelRegistry::from_yaml_str(
        r#"
default_models:
  router: gpt-4.1-nano
  extraction: gpt-4.1-nano
  summarizer: gpt-4.1-nano
models:
  gpt-4.1-nano:
    provider: openai
    token_limit: 128000
    is_vision_capable: true
    fallback: null
"#,
    )
    .unwrap();

    let config = PipelineConfig::builder(registry)
        .concurrency_limit(0)
        .rate_limit_per_minute(0)
        .retry_max_attempts(0)
        .build()
        .unwrap();

    assert_eq!(config.concurrency_limit, 1);
    assert_eq!(config.rate_limit_per_minute, 1);
    assert_eq!(config.retry_max_attempts, 1);
}
