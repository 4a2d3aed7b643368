//! Extraction strategy trait and the per-domain registry.
//!
//! A strategy bundles a declarative rule set with the extraction walk.
//! The registry maps domain hosts (and explicit strategy keys) to
//! strategies; an unregistered domain falls back to [`GenericStrategy`].

mod advocacy;
mod generic;
mod helsedirektoratet;

use std::collections::HashMap;
use std::sync::Arc;

use scraper::Html;
use url::Url;

use sourcebank_shared::Result;

pub use advocacy::AdvocacyStrategy;
pub use generic::GenericStrategy;
pub use helsedirektoratet::HelsedirektoratetStrategy;

use crate::Extraction;
use crate::metadata;
use crate::rules::StrategyRules;
use crate::walker;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A domain-specific (or generic) extraction rule set plus its walk.
pub trait ExtractionStrategy: Send + Sync {
    /// Stable strategy key, recorded on every extraction it produces.
    fn key(&self) -> &'static str;

    /// Hosts this strategy is registered for by default.
    fn hosts(&self) -> &'static [&'static str];

    /// The strategy's compiled rules.
    fn rules(&self) -> &StrategyRules;

    /// Extract typed blocks + metadata from a parsed document.
    ///
    /// The default walk covers every current strategy; implementations
    /// override only when a domain needs more than rules can express.
    fn extract(&self, doc: &Html, url: &Url) -> Result<Extraction> {
        extract_with_rules(doc, url, self.key(), self.rules())
    }
}

/// The shared extraction walk: exclusion set → content root → typed
/// blocks → metadata → structure score.
pub fn extract_with_rules(
    doc: &Html,
    _url: &Url,
    key: &str,
    rules: &StrategyRules,
) -> Result<Extraction> {
    let detected = walker::count_structural(doc);
    let excluded = walker::collect_excluded(doc, rules);

    let blocks = match walker::select_content_root(doc, rules, &excluded) {
        Some(root) => walker::walk_blocks(root, &excluded, rules),
        None => Vec::new(),
    };

    let title = metadata::extract_title(doc, &blocks, rules);
    let author = metadata::extract_author(doc, rules);
    let published_date = metadata::extract_published_date(doc, rules);
    let structure_score = walker::structure_score(detected, &blocks);

    Ok(Extraction {
        blocks,
        title,
        author,
        published_date,
        structure_score,
        strategy_used: key.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps strategy keys and domain hosts to strategies, with the generic
/// strategy as the always-available fallback.
pub struct StrategyRegistry {
    by_key: HashMap<&'static str, Arc<dyn ExtractionStrategy>>,
    by_host: HashMap<&'static str, Arc<dyn ExtractionStrategy>>,
    generic: Arc<dyn ExtractionStrategy>,
}

impl StrategyRegistry {
    /// Create a registry with all built-in strategies registered.
    pub fn new() -> Self {
        let generic: Arc<dyn ExtractionStrategy> = Arc::new(GenericStrategy::new());
        let mut registry = Self {
            by_key: HashMap::new(),
            by_host: HashMap::new(),
            generic: generic.clone(),
        };

        registry.register(generic);
        registry.register(Arc::new(HelsedirektoratetStrategy::new()));
        registry.register(Arc::new(AdvocacyStrategy::new()));
        registry
    }

    /// Register a strategy under its key and all of its hosts.
    pub fn register(&mut self, strategy: Arc<dyn ExtractionStrategy>) {
        for &host in strategy.hosts() {
            self.by_host.insert(host, strategy.clone());
        }
        self.by_key.insert(strategy.key(), strategy);
    }

    /// Resolve a strategy: explicit key first, then host lookup, then
    /// the generic fallback. Always returns a strategy.
    pub fn resolve(&self, strategy_key: Option<&str>, host: &str) -> &dyn ExtractionStrategy {
        if let Some(key) = strategy_key {
            if let Some(strategy) = self.by_key.get(key) {
                return strategy.as_ref();
            }
            tracing::warn!(key, "unknown strategy key, falling back to host lookup");
        }

        self.by_host
            .get(host.to_ascii_lowercase().as_str())
            .unwrap_or(&self.generic)
            .as_ref()
    }

    /// The generic fallback strategy.
    pub fn generic(&self) -> &dyn ExtractionStrategy {
        self.generic.as_ref()
    }

    /// Keys of all registered strategies.
    pub fn known_keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.by_key.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
