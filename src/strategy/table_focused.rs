//! Table-focused strategy: tables only, as `visual_elements` entries with
//! `element_type: "table"`. Entries reported under a different
//! `element_type` are dropped — this strategy exists specifically to give
//! tables a dedicated, less distractable pass.

use crate::model::ExtractionContent;
use crate::prompts::strategy_system_prompt;
use crate::strategy::{parse_content, Strategy};

pub struct TableFocusedStrategy;

impl Strategy for TableFocusedStrategy {
    fn needs_image(&self) -> bool {
        true
    }

    fn system_prompt(&self) -> String {
        strategy_system_prompt(crate::model::ExtractionStrategy::TableFocused)
    }

    fn parse(&self, raw: &str) -> Option<ExtractionContent> {
        let mut content = parse_content(raw)?;
        content.main_title = None;
        content.page_summary = None;
        content.key_sections.clear();
        content.visual_elements.retain(|v| v.element_type.eq_ignore_ascii_case("table"));
        Some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_non_table_visual_elements() {
        let raw = r#"{"visual_elements":[{"element_type":"table","title":"Revenue"},{"element_type":"chart","title":"Growth"}]}"#;
        let content = TableFocusedStrategy.parse(raw).unwrap();
        assert_eq!(content.visual_elements.len(), 1);
        assert_eq!(content.visual_elements[0].element_type, "table");
    }
}
