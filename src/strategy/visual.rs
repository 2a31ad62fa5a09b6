//! Visual strategy: charts, diagrams, and figures only — no title, summary,
//! or text sections.

use crate::model::ExtractionContent;
use crate::prompts::strategy_system_prompt;
use crate::strategy::{parse_content, Strategy};

pub struct VisualStrategy;

impl Strategy for VisualStrategy {
    fn needs_image(&self) -> bool {
        true
    }

    fn system_prompt(&self) -> String {
        strategy_system_prompt(crate::model::ExtractionStrategy::Visual)
    }

    fn parse(&self, raw: &str) -> Option<ExtractionContent> {
        let mut content = parse_content(raw)?;
        content.main_title = None;
        content.page_summary = None;
        content.key_sections.clear();
        Some(content)
    }
}
