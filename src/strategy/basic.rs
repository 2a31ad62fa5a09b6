//! Basic strategy: vision-assisted title + summary + key sections, no
//! visual element extraction.

use crate::model::ExtractionContent;
use crate::prompts::strategy_system_prompt;
use crate::strategy::{parse_content, Strategy};

pub struct BasicStrategy;

impl Strategy for BasicStrategy {
    fn needs_image(&self) -> bool {
        true
    }

    fn system_prompt(&self) -> String {
        strategy_system_prompt(crate::model::ExtractionStrategy::Basic)
    }

    fn parse(&self, raw: &str) -> Option<ExtractionContent> {
        let mut content = parse_content(raw)?;
        content.visual_elements.clear();
        Some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_key_sections_but_drops_visual_elements() {
        let raw = r#"{"main_title":"T","page_summary":"S","key_sections":[{"section_title":"A","content":"B"}],"visual_elements":[{"element_type":"chart"}]}"#;
        let content = BasicStrategy.parse(raw).unwrap();
        assert_eq!(content.key_sections.len(), 1);
        assert!(content.visual_elements.is_empty());
    }

    #[test]
    fn requests_image() {
        assert!(BasicStrategy.needs_image());
    }
}
