//! C8 — the Merger: folds every `ExtractionResult` a page accumulated
//! (across the Router's initial plan and any refinement cycles) into one
//! [`PageResult`].
//!
//! Merge policy:
//! - `main_title`/`page_summary` scalars: the first non-empty value from the
//!   successful step with the highest [`ExtractionStrategy::merge_rank`],
//!   ties broken by step order (earlier step wins);
//! - `key_sections`: concatenated across every successful step, then
//!   de-duplicated by `section_id` ([`crate::model::dedupe_key_sections`]);
//! - `visual_elements`: concatenated, then de-duplicated by
//!   `(element_type, title)` preferring the richer entry
//!   ([`crate::model::dedupe_visual_elements`]);
//! - `extraction_method` is `"fallback"` when the plan that produced these
//!   results was itself a router fallback plan, else `"smart_routing"`.

use crate::model::{dedupe_key_sections, dedupe_visual_elements, ExtractionResult, PageComplexity, PageResult};

pub fn merge(
    page_index: usize,
    page_complexity: PageComplexity,
    is_fallback_plan: bool,
    results: &[ExtractionResult],
) -> PageResult {
    let total_steps = results.len();
    let successful_steps = results.iter().filter(|r| r.success).count();

    let mut scalar_candidates: Vec<&ExtractionResult> = results.iter().filter(|r| r.success).collect();
    scalar_candidates.sort_by(|a, b| {
        b.strategy
            .merge_rank()
            .cmp(&a.strategy.merge_rank())
            .then(a.step_number.cmp(&b.step_number))
    });

    let main_title = scalar_candidates
        .iter()
        .find_map(|r| r.content.main_title.as_ref().filter(|s| !s.trim().is_empty()))
        .cloned();
    let page_summary = scalar_candidates
        .iter()
        .find_map(|r| r.content.page_summary.as_ref().filter(|s| !s.trim().is_empty()))
        .cloned();

    let key_sections = dedupe_key_sections(
        results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.content.key_sections.clone())
            .collect(),
    );

    let visual_elements = dedupe_visual_elements(
        results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.content.visual_elements.clone())
            .collect(),
    );

    PageResult {
        page_index,
        page_complexity,
        extraction_method: if is_fallback_plan { "fallback".to_string() } else { "smart_routing".to_string() },
        total_steps,
        successful_steps,
        main_title,
        page_summary,
        key_sections,
        visual_elements,
    }
}
