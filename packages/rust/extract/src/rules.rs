//! Declarative extraction rules.
//!
//! Each strategy is configuration first: selector lists for boilerplate
//! removal and content location, regexes for text-level boilerplate and
//! metadata, title suffixes to strip. Shared partial rule sets (the
//! government and NGO templates) compose by concatenation, so a new
//! domain is a rule set plus targeted overrides, not a subclass.

use regex::Regex;
use scraper::Selector;

/// A compiled, per-strategy rule set.
#[derive(Debug, Default)]
pub struct StrategyRules {
    /// Elements removed before any content selection.
    pub boilerplate_selectors: Vec<Selector>,
    /// Candidate main-content containers, tried in order.
    pub content_selectors: Vec<Selector>,
    /// Line-level boilerplate stripped from extracted block text.
    pub text_boilerplate: Vec<Regex>,
    /// Patterns whose first capture group is the author name.
    pub author_patterns: Vec<Regex>,
    /// Patterns whose first capture group is the published/updated date.
    pub date_patterns: Vec<Regex>,
    /// Suffixes stripped from the `<title>` text.
    pub title_suffixes: Vec<String>,
}

impl StrategyRules {
    /// Append another rule set's rules onto this one (delegation-style
    /// composition; later rules run after earlier ones).
    pub fn merge(mut self, other: StrategyRules) -> Self {
        self.boilerplate_selectors
            .extend(other.boilerplate_selectors);
        self.content_selectors.extend(other.content_selectors);
        self.text_boilerplate.extend(other.text_boilerplate);
        self.author_patterns.extend(other.author_patterns);
        self.date_patterns.extend(other.date_patterns);
        self.title_suffixes.extend(other.title_suffixes);
        self
    }

    /// Strip all configured text-boilerplate patterns from a block text,
    /// collapsing the whitespace left behind.
    pub fn strip_text_boilerplate(&self, text: &str) -> String {
        let mut out = text.to_string();
        for re in &self.text_boilerplate {
            out = re.replace_all(&out, "").into_owned();
        }
        collapse_ws(&out)
    }

    /// Strip configured suffixes from a page title.
    pub fn clean_title(&self, title: &str) -> String {
        let mut t = title.trim();
        for suffix in &self.title_suffixes {
            if let Some(stripped) = t.strip_suffix(suffix.as_str()) {
                t = stripped.trim_end();
            }
        }
        t.to_string()
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

fn regexes(list: &[&str]) -> Vec<Regex> {
    list.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

// ---------------------------------------------------------------------------
// Shared rule sets
// ---------------------------------------------------------------------------

/// Site chrome removed on every page regardless of domain.
pub fn base_rules() -> StrategyRules {
    StrategyRules {
        boilerplate_selectors: selectors(&[
            "nav",
            "header",
            "footer",
            "aside",
            "script",
            "style",
            "noscript",
            "iframe",
            "form",
            "svg",
            ".breadcrumb",
            ".cookie-banner",
            ".skip-link",
            ".site-header",
            ".site-footer",
            ".sidebar",
            ".share-buttons",
            ".social-share",
            ".print-button",
            ".advertisement",
            ".promo",
            ".banner",
        ]),
        content_selectors: selectors(&["main", "article", r#"[role="main"]"#]),
        text_boilerplate: regexes(&[
            r"(?i)skip to main content",
            r"(?i)accept all cookies",
        ]),
        author_patterns: regexes(&[
            r"(?i)(?:author|by)\s*:\s*([^,\n]{3,60})",
        ]),
        date_patterns: regexes(&[
            r"(\d{4}-\d{1,2}-\d{1,2})",
            r"(\d{1,2}[./]\d{1,2}[./]\d{4})",
        ]),
        title_suffixes: Vec::new(),
    }
}

/// Markup conventions of government guideline templates: locator
/// navigation, print/PDF utilities, versioning notices, citation blocks.
pub fn government_template() -> StrategyRules {
    StrategyRules {
        boilerplate_selectors: selectors(&[
            ".chapter-navigation",
            ".version-history",
            ".related-links",
            ".kontaktinfo",
            ".personvern",
            ".tilgjengelighet",
        ]),
        content_selectors: selectors(&[".main-content", "#content", ".page-content"]),
        text_boilerplate: regexes(&[
            r"(?i)skriv ut\s*/\s*lag pdf",
            r"(?i)se tidligere versjoner",
            r"(?i)åpne data \(api\)",
            r"(?i)slik refererer du til innholdet",
            r"Tilgjengelig fra https://\S+",
        ]),
        author_patterns: regexes(&[
            r"(?:Forfatter|Utgitt av)\s*:\s*([^,\n]{3,60})",
        ]),
        date_patterns: regexes(&[
            r"Siste faglige endring:\s*(\d{1,2}\.\s*\w+\s*\d{4})",
            r"Publisert:\s*(\d{1,2}\.\d{1,2}\.\d{4})",
            r"Oppdatert:\s*(\d{1,2}\.\d{1,2}\.\d{4})",
        ]),
        title_suffixes: Vec::new(),
    }
}

/// Markup conventions of advocacy-organization sites: chapter locators,
/// share widgets, fundraising calls to action.
pub fn ngo_template() -> StrategyRules {
    StrategyRules {
        boilerplate_selectors: selectors(&[
            ".chapter-locator",
            ".page-locator",
            ".donate-cta",
            ".donation-banner",
            ".newsletter-signup",
            ".related-content",
            ".toolbar",
        ]),
        content_selectors: selectors(&[".article-content", ".content-main", "#main-content"]),
        text_boilerplate: regexes(&[
            r"(?i)donate (?:now|today)",
            r"(?i)sign up for our (?:e-)?newsletter",
            r"(?i)share or print this page",
            r"(?i)støtt (?:oss|vårt arbeid)",
        ]),
        author_patterns: Vec::new(),
        date_patterns: regexes(&[r"(?i)last (?:updated|reviewed)\s*:?\s*([\w ,.]+\d{4})"]),
        title_suffixes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_in_order() {
        let merged = base_rules().merge(government_template());
        assert!(merged.boilerplate_selectors.len() > base_rules().boilerplate_selectors.len());
        // Base content selectors are tried before template ones.
        assert!(merged.content_selectors.len() >= 3);
    }

    #[test]
    fn text_boilerplate_stripping() {
        let rules = base_rules().merge(government_template());
        let text = "Behandling av demens Skriv ut / lag PDF Se tidligere versjoner";
        assert_eq!(rules.strip_text_boilerplate(text), "Behandling av demens");
    }

    #[test]
    fn title_suffix_stripping() {
        let rules = StrategyRules {
            title_suffixes: vec![" - Helsedirektoratet".into()],
            ..Default::default()
        };
        assert_eq!(
            rules.clean_title("Demens - Helsedirektoratet"),
            "Demens"
        );
        assert_eq!(rules.clean_title("Demens"), "Demens");
    }

    #[test]
    fn collapse_ws_normalizes() {
        assert_eq!(collapse_ws("  a \n\t b  "), "a b");
    }
}
