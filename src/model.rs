//! Core data types shared by every component: the page input the renderer
//! hands in, the plan the Router produces, the results the Extractor and
//! Merger produce, and the final per-document output.
//!
//! Anything that ultimately comes from an LLM response (`RouterAnalysis`,
//! `ExtractionContent`) is deliberately permissive: unknown fields are
//! dropped rather than rejected, and numeric fields accept either a number
//! or a descriptor string, because prompts cannot fully constrain what a
//! model returns.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PageError;

/// One rendered page handed to the Orchestrator by the (external) PDF
/// renderer. Immutable for the duration of processing.
#[derive(Debug, Clone)]
pub struct PageInput {
    pub page_index: usize,
    pub page_width: u32,
    pub page_height: u32,
    /// Base64-encoded raster image (PNG), ready to embed in a vision prompt.
    pub image_base64: String,
    /// Native text layer extracted alongside the raster, if any.
    pub text: String,
}

/// Classification a page can fall into, used by the Router to size the plan
/// and by its own tie-break rules (forcing `minimal` on `Simple` pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageComplexity {
    Simple,
    Moderate,
    Complex,
}

impl Default for PageComplexity {
    fn default() -> Self {
        PageComplexity::Moderate
    }
}

/// Accepts either a bare integer or a free-form descriptor string — the
/// Router's analysis prompt asks for counts, but vision models frequently
/// answer with "several" or "a few" instead of a number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexibleCount {
    Number(i64),
    Descriptor(String),
}

impl Default for FlexibleCount {
    fn default() -> Self {
        FlexibleCount::Number(0)
    }
}

impl FlexibleCount {
    /// Best-effort numeric estimate: a genuine number is used as-is; a
    /// descriptor is treated as "non-zero, unknown magnitude" (1) unless it
    /// reads as an explicit zero/none.
    pub fn estimate(&self) -> i64 {
        match self {
            FlexibleCount::Number(n) => *n,
            FlexibleCount::Descriptor(s) => {
                let lower = s.to_lowercase();
                if lower.contains("none") || lower.contains("zero") || lower.trim().is_empty() {
                    0
                } else {
                    1
                }
            }
        }
    }
}

/// Free-form classification summary from the vision LLM. Tolerant by
/// construction: `#[serde(default)]` on every field means a response missing
/// any of them still parses, and unknown fields are silently dropped because
/// this struct has no `deny_unknown_fields`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterAnalysis {
    #[serde(default)]
    pub page_complexity: PageComplexity,
    #[serde(default)]
    pub tables: FlexibleCount,
    #[serde(default)]
    pub charts: FlexibleCount,
    #[serde(default)]
    pub dense_text: FlexibleCount,
    #[serde(default)]
    pub recommended_strategies: Vec<String>,
}

/// A closed, build-time-extensible enumeration of strategy identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    Minimal,
    Basic,
    Comprehensive,
    Visual,
    TableFocused,
}

impl ExtractionStrategy {
    /// All known strategies, used to build the registry (C6) and to bound
    /// the refinement loop's "not yet tried" search.
    pub const ALL: [ExtractionStrategy; 5] = [
        ExtractionStrategy::Minimal,
        ExtractionStrategy::Basic,
        ExtractionStrategy::Comprehensive,
        ExtractionStrategy::Visual,
        ExtractionStrategy::TableFocused,
    ];

    /// Parses a strategy id from free-form LLM output. Unknown names return
    /// `None` — the caller drops them with a warning rather than failing.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "minimal" => Some(ExtractionStrategy::Minimal),
            "basic" => Some(ExtractionStrategy::Basic),
            "comprehensive" => Some(ExtractionStrategy::Comprehensive),
            "visual" => Some(ExtractionStrategy::Visual),
            "table_focused" | "tablefocused" | "table" => Some(ExtractionStrategy::TableFocused),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            ExtractionStrategy::Minimal => "minimal",
            ExtractionStrategy::Basic => "basic",
            ExtractionStrategy::Comprehensive => "comprehensive",
            ExtractionStrategy::Visual => "visual",
            ExtractionStrategy::TableFocused => "table_focused",
        }
    }

    /// Merge-policy rank used by the Merger to pick which step's scalar
    /// fields win a tie: higher is preferred.
    pub fn merge_rank(self) -> u8 {
        match self {
            ExtractionStrategy::Comprehensive => 4,
            ExtractionStrategy::Basic => 3,
            ExtractionStrategy::Visual => 2,
            ExtractionStrategy::TableFocused => 1,
            ExtractionStrategy::Minimal => 0,
        }
    }

    /// Whether this strategy needs the page image in its prompt. Only
    /// `minimal` is text-only (cost saver).
    pub fn is_vision(self) -> bool {
        !matches!(self, ExtractionStrategy::Minimal)
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One step in an `ExtractionPlan`. Steps are totally ordered by
/// `step_number`; duplicate strategies across steps are permitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionStep {
    pub step_number: u32,
    pub strategy: ExtractionStrategy,
    pub rationale: String,
    pub is_fallback: bool,
}

/// An ordered sequence of extraction steps for one page. Created by the
/// Router, extended (never mutated in place) by the Refinement Analyzer —
/// `extend` always returns a new plan whose step numbers continue from the
/// highest one already present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionPlan {
    pub page_index: usize,
    pub steps: Vec<ExtractionStep>,
    /// True when this plan came from a default/fallback path rather than a
    /// successful Router analysis — drives `extraction_method` in the merged
    /// `PageResult`.
    pub is_fallback_plan: bool,
    /// The Router's classification for this page (or `Moderate` when routing
    /// itself fell back), carried alongside the plan so the Merger can stamp
    /// it onto the final `PageResult` without re-deriving it.
    pub page_complexity: PageComplexity,
}

impl ExtractionPlan {
    pub fn next_step_number(&self) -> u32 {
        self.steps.iter().map(|s| s.step_number).max().unwrap_or(0) + 1
    }

    /// Append new steps, numbering them starting at `next_step_number()`.
    /// The caller supplies `(strategy, rationale)` pairs; `is_fallback` is
    /// always `false` for refinement-added steps (only the Router's default
    /// plan marks steps as fallback).
    pub fn extend_with(&mut self, additions: Vec<(ExtractionStrategy, String)>) {
        let mut next = self.next_step_number();
        for (strategy, rationale) in additions {
            self.steps.push(ExtractionStep {
                step_number: next,
                strategy,
                rationale,
                is_fallback: false,
            });
            next += 1;
        }
    }
}

/// One section of extracted body content. `section_id` is a stable content
/// hash of the normalized section body (see [`crate::strategy::section_id`])
/// so identical text produces identical ids across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySection {
    pub section_title: String,
    pub content: String,
    pub section_id: String,
}

/// A visual element (chart, table, image, ...) found on the page. Numeric
/// table/chart values are kept as strings throughout to preserve signs,
/// percent signs, and thousands separators that a numeric type would lose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualElement {
    pub element_type: String,
    #[serde(default)]
    pub title: String,
    /// Free-form typed details: row/column structure for tables, series
    /// data for charts, captions for images. Deliberately open-ended.
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl VisualElement {
    /// Count of populated fields, used by the Merger to prefer the richer of
    /// two entries that collide on `(element_type, title)`.
    fn field_richness(&self) -> usize {
        (!self.title.is_empty()) as usize + self.details.len()
    }
}

/// The strategy-specific open-structured content a parser produces. All
/// fields are optional; the Merger unions them across steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionContent {
    #[serde(default)]
    pub main_title: Option<String>,
    #[serde(default)]
    pub page_summary: Option<String>,
    #[serde(default)]
    pub key_sections: Vec<KeySection>,
    #[serde(default)]
    pub visual_elements: Vec<VisualElement>,
}

/// The outcome of executing a single plan step through its strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub step_number: u32,
    pub strategy: ExtractionStrategy,
    pub success: bool,
    pub content: ExtractionContent,
    pub error: Option<String>,
    pub model_used: String,
    pub elapsed_ms: u64,
}

/// The per-page consolidated record the Merger produces and the pipeline's
/// terminal artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub page_index: usize,
    pub page_complexity: PageComplexity,
    pub extraction_method: String,
    pub total_steps: usize,
    pub successful_steps: usize,
    pub main_title: Option<String>,
    pub page_summary: Option<String>,
    pub key_sections: Vec<KeySection>,
    pub visual_elements: Vec<VisualElement>,
}

/// One LLM endpoint entry from the model registry's YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmModelSpec {
    pub model_id: String,
    pub provider: String,
    pub token_limit: u32,
    pub is_vision_capable: bool,
    pub fallback: Option<String>,
}

/// Top-level output of `process_document`: every page's result plus a list
/// of pages that could not be recovered at all.
///
/// `cancelled` is set once the run's cancellation token was observed
/// cancelled while at least one page was still in flight: `pages` then holds
/// whichever pages had already finished, and pages that were still running
/// or never started are simply absent rather than appearing in `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub pages: Vec<PageResult>,
    pub errors: Vec<PageError>,
    #[serde(default)]
    pub cancelled: bool,
}

fn richer(a: &VisualElement, b: &VisualElement) -> bool {
    a.field_richness() >= b.field_richness()
}

/// De-duplicate visual elements by `(element_type, title)`, keeping whichever
/// colliding entry has more populated fields (ties keep the first seen).
pub fn dedupe_visual_elements(elements: Vec<VisualElement>) -> Vec<VisualElement> {
    let mut kept: Vec<VisualElement> = Vec::with_capacity(elements.len());
    for el in elements {
        if let Some(existing) = kept
            .iter_mut()
            .find(|k| k.element_type == el.element_type && k.title == el.title)
        {
            if !richer(existing, &el) {
                *existing = el;
            }
        } else {
            kept.push(el);
        }
    }
    kept
}

/// De-duplicate key sections by `section_id`, keeping the first occurrence.
pub fn dedupe_key_sections(sections: Vec<KeySection>) -> Vec<KeySection> {
    let mut seen = std::collections::HashSet::new();
    sections
        .into_iter()
        .filter(|s| seen.insert(s.section_id.clone()))
        .collect()
}
