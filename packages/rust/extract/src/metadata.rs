//! Page metadata extraction: title, author, published date.
//!
//! Meta tags are preferred; the strategy's text patterns are the
//! fallback, scanned over the visible document text.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use sourcebank_shared::ContentBlock;

use crate::rules::{StrategyRules, collapse_ws};

static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

static META_AUTHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="author"]"#).expect("valid selector"));

static META_DATE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"meta[property="article:published_time"], meta[name="date"], meta[name="last-modified"]"#,
    )
    .expect("valid selector")
});

static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Title: first extracted H1 block, then the document's `<h1>`, then
/// `<title>` with configured suffixes stripped.
pub fn extract_title(doc: &Html, blocks: &[ContentBlock], rules: &StrategyRules) -> Option<String> {
    for block in blocks {
        if let ContentBlock::Heading { level: 1, text } = block {
            return Some(rules.clean_title(text));
        }
    }

    if let Some(h1) = doc.select(&H1_SEL).next() {
        let text = collapse_ws(&h1.text().collect::<String>());
        if !text.is_empty() {
            return Some(rules.clean_title(&text));
        }
    }

    doc.select(&TITLE_SEL).next().and_then(|el| {
        let text = collapse_ws(&el.text().collect::<String>());
        (!text.is_empty()).then(|| rules.clean_title(&text))
    })
}

/// Author: `<meta name="author">`, then the strategy's author patterns.
pub fn extract_author(doc: &Html, rules: &StrategyRules) -> Option<String> {
    if let Some(meta) = doc.select(&META_AUTHOR_SEL).next() {
        if let Some(content) = meta.value().attr("content") {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }

    let text = document_text(doc);
    for pattern in &rules.author_patterns {
        if let Some(caps) = pattern.captures(&text) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().trim().to_string());
            }
        }
    }
    None
}

/// Published/updated date: publication meta tags, then the strategy's
/// date patterns. Kept verbatim as a string to preserve the source form
/// (Norwegian "8. desember 2023" vs ISO dates).
pub fn extract_published_date(doc: &Html, rules: &StrategyRules) -> Option<String> {
    if let Some(meta) = doc.select(&META_DATE_SEL).next() {
        if let Some(content) = meta.value().attr("content") {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }

    let text = document_text(doc);
    for pattern in &rules.date_patterns {
        if let Some(caps) = pattern.captures(&text) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().trim().to_string());
            }
        }
    }
    None
}

/// Visible text of the whole document, for metadata pattern scanning.
fn document_text(doc: &Html) -> String {
    doc.select(&BODY_SEL)
        .next()
        .map(|body| collapse_ws(&body.text().collect::<String>()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{base_rules, government_template};

    #[test]
    fn title_prefers_extracted_h1() {
        let doc = Html::parse_document(
            "<html><head><title>Demens - Helsedirektoratet</title></head><body><h1>Demens</h1></body></html>",
        );
        let blocks = vec![ContentBlock::Heading {
            level: 1,
            text: "Demens".into(),
        }];
        let title = extract_title(&doc, &blocks, &base_rules());
        assert_eq!(title.as_deref(), Some("Demens"));
    }

    #[test]
    fn title_falls_back_to_title_tag_with_suffix_stripped() {
        let mut rules = base_rules();
        rules.title_suffixes.push(" - Helsedirektoratet".into());

        let doc = Html::parse_document(
            "<html><head><title>Veileder om demens - Helsedirektoratet</title></head><body></body></html>",
        );
        let title = extract_title(&doc, &[], &rules);
        assert_eq!(title.as_deref(), Some("Veileder om demens"));
    }

    #[test]
    fn author_from_meta_tag() {
        let doc = Html::parse_document(
            r#"<html><head><meta name="author" content="Helsedirektoratet"></head><body></body></html>"#,
        );
        assert_eq!(
            extract_author(&doc, &base_rules()).as_deref(),
            Some("Helsedirektoratet")
        );
    }

    #[test]
    fn norwegian_date_pattern_from_text() {
        let rules = base_rules().merge(government_template());
        let doc = Html::parse_document(
            "<html><body><p>Siste faglige endring: 8. desember 2023</p></body></html>",
        );
        assert_eq!(
            extract_published_date(&doc, &rules).as_deref(),
            Some("8. desember 2023")
        );
    }

    #[test]
    fn missing_metadata_is_none() {
        let doc = Html::parse_document("<html><body><p>Ingen metadata her.</p></body></html>");
        assert_eq!(extract_author(&doc, &base_rules()), None);
    }
}
