//! Prompt templates for the Router, Extraction Strategies, and Refinement
//! Analyzer.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing a strategy's instructions or the
//!    router's analysis rules requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without spinning up a real LLM, making prompt regressions easy to catch.
//!
//! Every prompt instructs the model to answer with a single JSON object and
//! nothing else; [`crate::strategy`] and [`crate::router`] parse that object
//! tolerantly (unknown fields ignored, missing fields defaulted).

/// System prompt for the Router (C5): classify a page's visual complexity
/// and recommend which extraction strategies are worth running.
pub const ROUTER_SYSTEM_PROMPT: &str = r#"You are a document page triage assistant. Look at the page image and its extracted text, then report your analysis as a single JSON object with exactly these fields:

{
  "page_complexity": "simple" | "moderate" | "complex",
  "tables": <integer count of distinct tables, or a short phrase if you cannot count exactly>,
  "charts": <integer count of distinct charts/figures, or a short phrase>,
  "dense_text": <integer count of dense text blocks, or a short phrase>,
  "recommended_strategies": [array of zero or more of: "minimal", "basic", "comprehensive", "visual", "table_focused"]
}

Guidance:
- "simple" pages are mostly sparse text with no tables or figures.
- "complex" pages have multiple tables, charts, or dense mixed layouts.
- Recommend "table_focused" only when at least one table is present.
- Recommend "visual" only when at least one chart or figure is present.
- Output ONLY the JSON object. No commentary, no markdown fences."#;

/// System prompt for the Refinement Analyzer (C9): judge whether a page's
/// merged extraction is missing anything, and if so, which strategies would
/// recover it.
pub const REFINEMENT_SYSTEM_PROMPT: &str = r#"You are reviewing a structured extraction of a document page against the page image. Decide whether the extraction is missing material content. Respond with a single JSON object:

{
  "needs_refinement": true | false,
  "missing_aspects": [array of short strings naming what is missing, e.g. "table on right column", "footnote text"],
  "recommended_strategies": [array of zero or more of: "minimal", "basic", "comprehensive", "visual", "table_focused"]
}

Only set "needs_refinement" to true when you can point to specific missing content visible on the page. Output ONLY the JSON object."#;

/// Per-strategy instruction body, appended after a shared preamble. Each
/// string completes the sentence "Extract the following from this page:".
fn strategy_instructions(strategy: crate::model::ExtractionStrategy) -> &'static str {
    use crate::model::ExtractionStrategy::*;
    match strategy {
        Minimal => {
            r#"- "main_title": the page's title if present, else null.
- "page_summary": one or two sentences summarizing the page's purpose.
Do not extract key_sections or visual_elements for this pass."#
        }
        Basic => {
            r#"- "main_title": the page's title if present, else null.
- "page_summary": one or two sentences summarizing the page.
- "key_sections": an array of { "section_title", "content" } covering every distinct section of body text on the page, in reading order."#
        }
        Comprehensive => {
            r#"- "main_title", "page_summary", and "key_sections" as for a basic extraction.
- "visual_elements": an array of { "element_type", "title", "details" } covering every chart, diagram, table, or figure on the page. Keep numeric values inside "details" as strings to preserve formatting (units, thousands separators)."#
        }
        Visual => {
            r#"- "visual_elements": an array of { "element_type", "title", "details" } covering every chart, diagram, or figure on the page (not plain tables — see table_focused for those). Leave "main_title", "page_summary", and "key_sections" empty."#
        }
        TableFocused => {
            r#"- "visual_elements": an array of { "element_type": "table", "title", "details" } where "details" captures the table's rows and columns (e.g. a "rows" array of row objects, or a "columns"/"data" structure — whichever best preserves the table's structure). Leave "main_title", "page_summary", and "key_sections" empty."#
        }
    }
}

/// Build the full system prompt for one extraction strategy pass.
pub fn strategy_system_prompt(strategy: crate::model::ExtractionStrategy) -> String {
    format!(
        r#"You are extracting structured content from a single document page. Respond with a single JSON object with exactly these top-level fields (use null or empty arrays for anything not requested below):

{{
  "main_title": string or null,
  "page_summary": string or null,
  "key_sections": [ {{ "section_title": string, "content": string }} ],
  "visual_elements": [ {{ "element_type": string, "title": string, "details": object }} ]
}}

For this pass, extract:
{}

Output ONLY the JSON object. No commentary, no markdown fences."#,
        strategy_instructions(strategy)
    )
}
