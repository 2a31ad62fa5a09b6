//! Minimal strategy: text-only, title + summary. No image, no sections.

use crate::model::ExtractionContent;
use crate::prompts::strategy_system_prompt;
use crate::strategy::{parse_content, Strategy};

pub struct MinimalStrategy;

impl Strategy for MinimalStrategy {
    fn needs_image(&self) -> bool {
        false
    }

    fn system_prompt(&self) -> String {
        strategy_system_prompt(crate::model::ExtractionStrategy::Minimal)
    }

    fn parse(&self, raw: &str) -> Option<ExtractionContent> {
        let mut content = parse_content(raw)?;
        content.key_sections.clear();
        content.visual_elements.clear();
        Some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_sections_and_visuals_even_if_model_returns_them() {
        let raw = r#"{"main_title":"Q3 Report","page_summary":"overview","key_sections":[{"section_title":"x","content":"y"}]}"#;
        let content = MinimalStrategy.parse(raw).unwrap();
        assert_eq!(content.main_title.as_deref(), Some("Q3 Report"));
        assert!(content.key_sections.is_empty());
    }

    #[test]
    fn does_not_request_image() {
        assert!(!MinimalStrategy.needs_image());
    }
}
