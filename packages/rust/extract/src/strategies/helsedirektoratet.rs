//! Extraction strategy for helsedirektoratet.no (Norwegian Directorate
//! of Health): guidelines (veiledere), clinical recommendations
//! (retningslinjer), and policy documents.
//!
//! Pages follow the government guideline template, with locator
//! navigation, print/PDF utilities, versioning notices, and a citation
//! block ("Slik refererer du til innholdet") that must not leak into
//! the extracted text.

use regex::Regex;
use scraper::Selector;

use super::ExtractionStrategy;
use crate::rules::{StrategyRules, base_rules, government_template};

pub struct HelsedirektoratetStrategy {
    rules: StrategyRules,
}

impl HelsedirektoratetStrategy {
    pub fn new() -> Self {
        let own = StrategyRules {
            boilerplate_selectors: [
                ".navbar",
                ".nav-menu",
                ".veileder-nav",
                ".kapittel-nav",
            ]
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect(),
            content_selectors: [".veileder-content", ".retningslinje-content", ".article-content"]
                .iter()
                .filter_map(|s| Selector::parse(s).ok())
                .collect(),
            text_boilerplate: [
                // Citation block: "Helsedirektoratet (2023). Nasjonal faglig ..."
                r"Helsedirektoratet \(\d{4}\)\.",
                r"(?i)få tilgang til innhold",
                r"https://utvikler\.helsedirektoratet\.no\S*",
            ]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
            author_patterns: Vec::new(),
            date_patterns: Vec::new(),
            title_suffixes: vec![" - Helsedirektoratet".into()],
        };

        Self {
            rules: base_rules().merge(government_template()).merge(own),
        }
    }
}

impl Default for HelsedirektoratetStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for HelsedirektoratetStrategy {
    fn key(&self) -> &'static str {
        "helsedirektoratet"
    }

    fn hosts(&self) -> &'static [&'static str] {
        &["helsedirektoratet.no", "www.helsedirektoratet.no"]
    }

    fn rules(&self) -> &StrategyRules {
        &self.rules
    }
}
