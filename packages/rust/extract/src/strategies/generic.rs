//! Generic (fallback) extraction strategy.
//!
//! Used for every domain without a registered strategy. Relies on the
//! base boilerplate rules plus the content-density heuristic in the
//! walker: the largest contiguous block-level region with a low
//! link-to-text ratio is treated as main content.

use super::ExtractionStrategy;
use crate::rules::{StrategyRules, base_rules};

pub struct GenericStrategy {
    rules: StrategyRules,
}

impl GenericStrategy {
    pub fn new() -> Self {
        Self {
            rules: base_rules(),
        }
    }
}

impl Default for GenericStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for GenericStrategy {
    fn key(&self) -> &'static str {
        "generic"
    }

    fn hosts(&self) -> &'static [&'static str] {
        &[]
    }

    fn rules(&self) -> &StrategyRules {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;
    use sourcebank_shared::ContentBlock;
    use url::Url;

    fn page_url() -> Url {
        Url::parse("https://ukjent-kilde.no/artikkel").unwrap()
    }

    #[test]
    fn extracts_article_and_drops_chrome() {
        let html = r#"<html><head><title>Artikkel | Ukjent Kilde</title></head><body>
            <header><nav><a href="/">Hjem</a><a href="/om">Om oss</a></nav></header>
            <main>
                <h1>Kosthold ved demens</h1>
                <p>Et variert kosthold er viktig for personer med demens.</p>
                <ul><li>Frukt og grønt</li><li>Fullkorn</li></ul>
            </main>
            <footer><p>Kontakt oss | Personvern</p></footer>
        </body></html>"#;

        let doc = Html::parse_document(html);
        let strategy = GenericStrategy::new();
        let extraction = strategy.extract(&doc, &page_url()).unwrap();

        assert_eq!(extraction.strategy_used, "generic");
        assert_eq!(extraction.title.as_deref(), Some("Kosthold ved demens"));
        assert!(extraction.blocks.iter().any(|b| matches!(
            b,
            ContentBlock::Paragraph { text } if text.contains("variert kosthold")
        )));
        assert!(!extraction.blocks.iter().any(|b| matches!(
            b,
            ContentBlock::Paragraph { text } if text.contains("Personvern")
        )));
        assert!((extraction.structure_score - 1.0).abs() < 0.35);
    }

    #[test]
    fn no_content_yields_empty_blocks() {
        let doc = Html::parse_document("<html><body><nav><a href=\"/\">Hjem</a></nav></body></html>");
        let strategy = GenericStrategy::new();
        let extraction = strategy.extract(&doc, &page_url()).unwrap();
        assert!(extraction.blocks.is_empty());
    }
}
