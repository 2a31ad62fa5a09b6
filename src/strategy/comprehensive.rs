//! Comprehensive strategy: everything basic extracts, plus visual elements.
//! The most expensive strategy; the Router's default fallback.

use crate::model::ExtractionContent;
use crate::prompts::strategy_system_prompt;
use crate::strategy::{parse_content, Strategy};

pub struct ComprehensiveStrategy;

impl Strategy for ComprehensiveStrategy {
    fn needs_image(&self) -> bool {
        true
    }

    fn system_prompt(&self) -> String {
        strategy_system_prompt(crate::model::ExtractionStrategy::Comprehensive)
    }

    fn parse(&self, raw: &str) -> Option<ExtractionContent> {
        parse_content(raw)
    }
}
