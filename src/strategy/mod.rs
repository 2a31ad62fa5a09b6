//! C6 — the Extraction Strategy Registry: one implementation per
//! [`ExtractionStrategy`], each producing a prompt and parsing the model's
//! response into an [`ExtractionContent`]. Also home to two helpers shared
//! by every strategy and by the Router: stable section ids and a single
//! repair pass over malformed LLM JSON.

pub mod basic;
pub mod comprehensive;
pub mod minimal;
pub mod table_focused;
pub mod visual;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::model::{ExtractionContent, ExtractionStrategy, KeySection, PageInput, VisualElement};

/// What one strategy needs to run: whether it needs the page image attached,
/// its system prompt, and how to turn a raw model response into structured
/// content. A parse failure returns `None` — callers attempt exactly one
/// repair pass via [`repair_json`] before giving up on the step.
pub trait Strategy: Send + Sync {
    fn needs_image(&self) -> bool;
    fn system_prompt(&self) -> String;
    fn parse(&self, raw: &str) -> Option<ExtractionContent>;
}

/// Look up the implementation for a strategy id.
pub fn for_strategy(strategy: ExtractionStrategy) -> Box<dyn Strategy> {
    match strategy {
        ExtractionStrategy::Minimal => Box::new(minimal::MinimalStrategy),
        ExtractionStrategy::Basic => Box::new(basic::BasicStrategy),
        ExtractionStrategy::Comprehensive => Box::new(comprehensive::ComprehensiveStrategy),
        ExtractionStrategy::Visual => Box::new(visual::VisualStrategy),
        ExtractionStrategy::TableFocused => Box::new(table_focused::TableFocusedStrategy),
    }
}

/// Build the user-turn text every strategy sends: the page's native text
/// layer, or a short note when the page has none (scanned image with no
/// embedded text).
pub fn user_text(page: &PageInput) -> String {
    if page.text.trim().is_empty() {
        "This page has no embedded text layer; rely on the image.".to_string()
    } else {
        page.text.clone()
    }
}

/// Mirrors `ExtractionContent` but without `section_id` — the model is never
/// asked to invent an id, so `RawContent` is deserialized from the model's
/// JSON and then turned into `ExtractionContent` with ids computed from each
/// section's own (title, content) via [`section_id`].
#[derive(Debug, Deserialize, Default)]
struct RawContent {
    #[serde(default)]
    main_title: Option<String>,
    #[serde(default)]
    page_summary: Option<String>,
    #[serde(default)]
    key_sections: Vec<RawKeySection>,
    #[serde(default)]
    visual_elements: Vec<VisualElement>,
}

#[derive(Debug, Deserialize)]
struct RawKeySection {
    #[serde(default)]
    section_title: String,
    #[serde(default)]
    content: String,
}

fn materialize(raw: RawContent) -> ExtractionContent {
    ExtractionContent {
        main_title: raw.main_title,
        page_summary: raw.page_summary,
        key_sections: raw
            .key_sections
            .into_iter()
            .map(|s| KeySection {
                section_id: section_id(&s.section_title, &s.content),
                section_title: s.section_title,
                content: s.content,
            })
            .collect(),
        visual_elements: raw.visual_elements,
    }
}

/// Generic parse shared by every strategy: deserialize directly, and if that
/// fails, attempt one repair pass (strip code fences, trim to the outermost
/// JSON object) before giving up.
pub fn parse_content(raw: &str) -> Option<ExtractionContent> {
    if let Ok(content) = serde_json::from_str::<RawContent>(raw) {
        return Some(materialize(content));
    }
    let repaired = repair_json(raw)?;
    serde_json::from_str::<RawContent>(&repaired).ok().map(materialize)
}

/// Strip Markdown code fences and trim to the outermost `{ ... }` span.
/// Returns `None` if no brace pair can be found at all.
pub fn repair_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_fences = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    };

    let start = without_fences.find('{')?;
    let end = without_fences.rfind('}')?;
    if end < start {
        return None;
    }
    Some(without_fences[start..=end].to_string())
}

/// Stable content-hash id for a key section: a pure function of the
/// section's body alone, so the same content re-extracted under a
/// different title, or with incidental internal-whitespace differences,
/// still yields the same id and the Merger can de-duplicate by id alone.
pub fn section_id(_section_title: &str, content: &str) -> String {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_json_strips_code_fences() {
        let raw = "```json\n{\"main_title\": \"Hi\"}\n```";
        assert_eq!(repair_json(raw).unwrap(), "{\"main_title\": \"Hi\"}");
    }

    #[test]
    fn repair_json_trims_leading_commentary() {
        let raw = "Sure, here is the JSON:\n{\"a\": 1}\nHope that helps!";
        assert_eq!(repair_json(raw).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn repair_json_returns_none_without_braces() {
        assert!(repair_json("no json here").is_none());
    }

    #[test]
    fn section_id_ignores_the_title() {
        let a = section_id("Revenue", "Total sales grew 10%");
        let b = section_id("Summary", "Total sales grew 10%");
        let c = section_id("Revenue", "Something else");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn section_id_collapses_internal_whitespace() {
        let a = section_id("Revenue", "Total  sales\ngrew 10%");
        let b = section_id("Revenue", "Total sales grew 10%");
        assert_eq!(a, b);
    }
}
