//! Domain-aware content extraction: raw HTML bytes → typed blocks +
//! metadata + quality score.
//!
//! The pipeline is: charset repair (header → meta → byte sniffing),
//! strategy resolution (registered domain strategy or generic
//! fallback), boilerplate exclusion, content-root selection, the typed
//! block walk, and the quality gates. A failed domain strategy degrades
//! to the generic strategy before the minimum-content gate decides.

mod encoding;
mod metadata;
mod rules;
mod strategies;
mod walker;

use scraper::Html;
use tracing::{debug, instrument, warn};
use url::Url;

use sourcebank_shared::{ContentBlock, ExtractConfig, ExtractionError, Result};

pub use encoding::decode_html;
pub use rules::{StrategyRules, base_rules, government_template, ngo_template};
pub use strategies::{
    AdvocacyStrategy, ExtractionStrategy, GenericStrategy, HelsedirektoratetStrategy,
    StrategyRegistry, extract_with_rules,
};
pub use walker::{count_structural, structure_score};

/// Extraction output, prior to persistence.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Typed content blocks in document order.
    pub blocks: Vec<ContentBlock>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    /// Fraction of structural elements retained, in [0,1].
    pub structure_score: f64,
    /// Key of the strategy that produced this extraction.
    pub strategy_used: String,
}

impl Extraction {
    /// Total visible characters across all blocks.
    pub fn text_len(&self) -> usize {
        self.blocks.iter().map(ContentBlock::text_len).sum()
    }
}

/// Extract structured content from raw page bytes.
///
/// `strategy_key` is the registered domain's explicit strategy, if any;
/// otherwise the URL's host picks the strategy. If a domain strategy
/// fails, extraction retries with the generic strategy before giving
/// up. Yields [`ExtractionError::EmptyContent`] when the result falls
/// below the configured minimum.
#[instrument(skip_all, fields(url = %url))]
pub fn extract_content(
    bytes: &[u8],
    content_type: Option<&str>,
    url: &Url,
    strategy_key: Option<&str>,
    registry: &StrategyRegistry,
    config: &ExtractConfig,
) -> Result<Extraction> {
    let html = decode_html(bytes, content_type)?;
    let doc = Html::parse_document(&html);

    let host = url.host_str().unwrap_or_default();
    let strategy = registry.resolve(strategy_key, host);

    let extraction = match strategy.extract(&doc, url) {
        Ok(extraction) => extraction,
        Err(e) if strategy.key() != "generic" => {
            warn!(
                strategy = strategy.key(),
                error = %e,
                "domain strategy failed, falling back to generic"
            );
            registry.generic().extract(&doc, url)?
        }
        Err(e) => return Err(e),
    };

    let found = extraction.text_len();
    if found < config.min_content_chars {
        debug!(found, min = config.min_content_chars, "content below threshold");
        return Err(ExtractionError::EmptyContent {
            min_chars: config.min_content_chars,
            found,
        }
        .into());
    }

    debug!(
        blocks = extraction.blocks.len(),
        score = extraction.structure_score,
        strategy = %extraction.strategy_used,
        "extraction complete"
    );

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExtractConfig {
        ExtractConfig {
            min_content_chars: 100,
        }
    }

    fn article_html(body: &str) -> String {
        format!("<html><head><title>Test</title></head><body><main>{body}</main></body></html>")
    }

    #[test]
    fn extracts_utf8_page_end_to_end() {
        let html = article_html(
            "<h1>Demensomsorg</h1>\
             <p>God demensomsorg krever kunnskap, tålmodighet og samarbeid mellom helsetjenesten og pårørende over tid.</p>\
             <p>Kommunen har ansvar for å tilby dagaktivitetstilbud til hjemmeboende personer med demens.</p>",
        );
        let registry = StrategyRegistry::new();
        let url = Url::parse("https://ukjent.no/demens").unwrap();

        let extraction = extract_content(
            html.as_bytes(),
            Some("text/html; charset=utf-8"),
            &url,
            None,
            &registry,
            &config(),
        )
        .unwrap();

        assert_eq!(extraction.strategy_used, "generic");
        assert_eq!(extraction.title.as_deref(), Some("Demensomsorg"));
        assert!(extraction.structure_score >= 0.0 && extraction.structure_score <= 1.0);
    }

    #[test]
    fn latin1_bytes_decode_before_matching() {
        // "Pårørende må følge opp..." encoded as ISO-8859-1.
        let text = "Pårørende må følge opp behandlingen sammen med fastlegen. Dette gjelder særlig ved langtkommen demens hvor hukommelsen svikter.";
        let html = article_html(&format!("<h1>Råd</h1><p>{text}</p>"));
        let (latin1, _, _) = encoding_rs::WINDOWS_1252.encode(&html);

        let registry = StrategyRegistry::new();
        let url = Url::parse("https://ukjent.no/rad").unwrap();
        let extraction = extract_content(
            &latin1,
            Some("text/html; charset=ISO-8859-1"),
            &url,
            None,
            &registry,
            &config(),
        )
        .unwrap();

        let all_text: String = extraction
            .blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Paragraph { text } => text.clone(),
                _ => String::new(),
            })
            .collect();
        assert!(all_text.contains("Pårørende må følge"), "got: {all_text}");
        assert!(!all_text.contains('Ã'), "mojibake detected: {all_text}");
    }

    #[test]
    fn navigation_only_page_fails_with_empty_content() {
        let html = "<html><body><nav><ul><li><a href=\"/a\">Tilbud</a></li><li><a href=\"/b\">Kontakt</a></li></ul></nav></body></html>";
        let registry = StrategyRegistry::new();
        let url = Url::parse("https://ukjent.no/").unwrap();

        let err = extract_content(
            html.as_bytes(),
            Some("text/html"),
            &url,
            None,
            &registry,
            &config(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("below 100 chars"), "got: {err}");
    }

    #[test]
    fn domain_strategy_selected_by_host() {
        let html = article_html(
            "<h1>Demens</h1>\
             <p>Utredning av demens skal tilbys alle med mistanke om kognitiv svikt, uavhengig av alder og bosituasjon.</p>",
        );
        let registry = StrategyRegistry::new();
        let url = Url::parse("https://www.helsedirektoratet.no/veiledere/demens").unwrap();

        let extraction = extract_content(
            html.as_bytes(),
            Some("text/html; charset=utf-8"),
            &url,
            None,
            &registry,
            &config(),
        )
        .unwrap();
        assert_eq!(extraction.strategy_used, "helsedirektoratet");
    }

    #[test]
    fn deterministic_across_runs() {
        let html = article_html(
            "<h1>Demens</h1><p>Første avsnitt om demens og utredning i kommunehelsetjenesten.</p>\
             <ul><li>Punkt en om tilrettelegging</li><li>Punkt to om oppfølging</li></ul>",
        );
        let registry = StrategyRegistry::new();
        let url = Url::parse("https://ukjent.no/demens").unwrap();

        let a = extract_content(
            html.as_bytes(),
            Some("text/html"),
            &url,
            None,
            &registry,
            &config(),
        )
        .unwrap();
        let b = extract_content(
            html.as_bytes(),
            Some("text/html"),
            &url,
            None,
            &registry,
            &config(),
        )
        .unwrap();

        assert_eq!(a.blocks, b.blocks);
        assert_eq!(a.title, b.title);
        assert!((a.structure_score - b.structure_score).abs() < f64::EPSILON);
    }
}
