//! Extraction strategy for advocacy-organization sites (Alzheimer's
//! associations and similar patient organizations).
//!
//! These sites share a template family: chapter/locator navigation
//! between article sections, share widgets, and fundraising calls to
//! action interleaved with the content.

use scraper::Selector;

use super::ExtractionStrategy;
use crate::rules::{StrategyRules, base_rules, ngo_template};

pub struct AdvocacyStrategy {
    rules: StrategyRules,
}

impl AdvocacyStrategy {
    pub fn new() -> Self {
        let own = StrategyRules {
            boilerplate_selectors: [".local-resources", ".helpline-banner", ".event-promo"]
                .iter()
                .filter_map(|s| Selector::parse(s).ok())
                .collect(),
            content_selectors: Vec::new(),
            text_boilerplate: Vec::new(),
            author_patterns: Vec::new(),
            date_patterns: Vec::new(),
            title_suffixes: vec![
                " | alz.org".into(),
                " | Alzheimer Europe".into(),
                " - Nasjonalforeningen for folkehelsen".into(),
            ],
        };

        Self {
            rules: base_rules().merge(ngo_template()).merge(own),
        }
    }
}

impl Default for AdvocacyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for AdvocacyStrategy {
    fn key(&self) -> &'static str {
        "advocacy"
    }

    fn hosts(&self) -> &'static [&'static str] {
        &[
            "alz.org",
            "www.alz.org",
            "alzheimer-europe.org",
            "www.alzheimer-europe.org",
            "nasjonalforeningen.no",
            "www.nasjonalforeningen.no",
        ]
    }

    fn rules(&self) -> &StrategyRules {
        &self.rules
    }
}
