//! Sitemap discovery and recursive expansion for trusted-source domains.
//!
//! Before any page work can happen, a domain's sitemap(s) must be located
//! and expanded into a flat set of page URLs. Discovery probes robots.txt
//! `Sitemap:` directives and the conventional locations; expansion walks
//! sitemap indexes recursively with a depth bound and a cycle guard, and
//! reports partial results instead of silently returning zero when an
//! index cannot be fully expanded.

mod parser;

use std::collections::HashSet;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use sourcebank_shared::{DiscoveryError, Result, SourcebankError};

pub use parser::{SitemapDoc, SitemapEntry, looks_like_xml, parse_sitemap};

/// Maximum number of redirects to follow when fetching sitemaps.
const MAX_REDIRECTS: usize = 3;

/// Default timeout in seconds for discovery requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Maximum sitemap document size we consider valid (10 MB).
const MAX_SITEMAP_BYTES: u64 = 10 * 1024 * 1024;

/// Default recursion depth for sitemap-index expansion. Generous enough
/// for real index-of-indexes layouts, bounded to guard against cycles
/// and abuse.
const DEFAULT_MAX_DEPTH: u32 = 5;

/// Conventional sitemap locations probed when robots.txt has no directive.
const COMMON_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemaps.xml",
];

/// Query parameters stripped during URL normalization (tracking only;
/// authority sites use other params for content routing).
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("sourcebank/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options & outcomes
// ---------------------------------------------------------------------------

/// Configuration for discovery and expansion.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
    /// Maximum index recursion depth.
    pub max_depth: u32,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A sitemap that could not be fetched or parsed during expansion.
#[derive(Debug, Clone)]
pub struct SitemapFailure {
    pub url: String,
    pub reason: String,
}

/// Result of recursively expanding a set of sitemaps.
///
/// A partially expanded index yields its reachable entries plus explicit
/// `truncated_by_depth`/`failures` counts — callers can always tell a
/// genuinely empty domain from a broken one.
#[derive(Debug, Clone, Default)]
pub struct ExpandOutcome {
    /// Deduplicated page entries in first-seen order.
    pub entries: Vec<SitemapEntry>,
    /// Number of sitemap documents fetched and parsed.
    pub sitemaps_visited: usize,
    /// Index references skipped because the depth bound was hit.
    pub truncated_by_depth: usize,
    /// Per-sitemap fetch/parse failures; siblings continue regardless.
    pub failures: Vec<SitemapFailure>,
}

// ---------------------------------------------------------------------------
// Sitemap discovery
// ---------------------------------------------------------------------------

/// Discover sitemap locations for a domain.
///
/// Checks robots.txt `Sitemap:` directives first (on the origin and its
/// `www.` sibling), then probes the conventional locations. Fails with
/// [`DiscoveryError::NoSitemap`] if nothing is found.
#[instrument(skip_all, fields(root = %root_url))]
pub async fn discover_sitemaps(root_url: &Url, opts: &DiscoveryOptions) -> Result<Vec<String>> {
    let client = build_client(opts)?;
    let host = root_url
        .host_str()
        .ok_or_else(|| SourcebankError::validation(format!("URL has no host: {root_url}")))?
        .to_string();

    let mut found: Vec<String> = Vec::new();

    for origin in candidate_origins(root_url) {
        let robots_url = format!("{origin}/robots.txt");
        match fetch_text(&client, &robots_url).await {
            Ok(body) => {
                for sitemap in robots_sitemap_directives(&body) {
                    if !found.contains(&sitemap) {
                        info!(%sitemap, "sitemap found in robots.txt");
                        found.push(sitemap);
                    }
                }
            }
            Err(e) => debug!(url = %robots_url, error = %e, "robots.txt unavailable"),
        }
        if !found.is_empty() {
            break;
        }
    }

    if found.is_empty() {
        for origin in candidate_origins(root_url) {
            for path in COMMON_SITEMAP_PATHS {
                let candidate = format!("{origin}{path}");
                if validate_sitemap_url(&client, &candidate).await {
                    info!(sitemap = %candidate, "sitemap found at conventional location");
                    found.push(candidate);
                    break;
                }
            }
            if !found.is_empty() {
                break;
            }
        }
    }

    if found.is_empty() {
        warn!(%host, "no sitemap found");
        return Err(DiscoveryError::NoSitemap { host }.into());
    }

    Ok(found)
}

/// Origins to probe: the URL's own origin, plus its `www.`/bare sibling
/// when the host is a plain domain name.
fn candidate_origins(url: &Url) -> Vec<String> {
    let mut origins = vec![origin_of(url)];

    if let Some(host) = url.host_str() {
        if url.port().is_none() && host.parse::<std::net::IpAddr>().is_err() {
            let sibling = match host.strip_prefix("www.") {
                Some(bare) => bare.to_string(),
                None => format!("www.{host}"),
            };
            origins.push(format!("{}://{}", url.scheme(), sibling));
        }
    }

    origins
}

/// Extract the origin (scheme + host + port) from a URL.
fn origin_of(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    }
}

/// Parse `Sitemap:` directives out of a robots.txt body.
fn robots_sitemap_directives(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix("Sitemap:")
                .or_else(|| line.strip_prefix("sitemap:"))?;
            let url = rest.trim();
            (!url.is_empty()).then(|| url.to_string())
        })
        .collect()
}

/// Probe a candidate sitemap URL: 2xx and an XML-looking body.
async fn validate_sitemap_url(client: &Client, url: &str) -> bool {
    match fetch_text(client, url).await {
        Ok(body) => looks_like_xml(&body),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Recursive expansion
// ---------------------------------------------------------------------------

/// Expand sitemaps recursively into a flat, deduplicated set of page entries.
///
/// Walks the sitemap tree from `roots`. `<sitemap>` references recurse up to
/// `opts.max_depth`; `<url>` entries are collected. A visited set guards
/// against duplicate references and cycles. Fetch/parse failures are
/// collected per sitemap and never abort sibling expansion.
#[instrument(skip_all, fields(roots = roots.len()))]
pub async fn expand(roots: &[String], opts: &DiscoveryOptions) -> Result<ExpandOutcome> {
    let client = build_client(opts)?;
    let mut outcome = ExpandOutcome::default();

    let mut visited: HashSet<String> = HashSet::new();
    let mut seen_locs: HashSet<String> = HashSet::new();
    let mut queue: Vec<(String, u32)> = roots.iter().map(|u| (u.clone(), 0)).collect();

    while let Some((sitemap_url, depth)) = queue.pop() {
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }

        let body = match fetch_text(&client, &sitemap_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %sitemap_url, error = %e, "sitemap fetch failed");
                outcome.failures.push(SitemapFailure {
                    url: sitemap_url,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        outcome.sitemaps_visited += 1;

        match parse_sitemap(&body, &sitemap_url) {
            Ok(SitemapDoc::Index(refs)) => {
                debug!(url = %sitemap_url, nested = refs.len(), depth, "sitemap index");
                if depth >= opts.max_depth {
                    // Report what we are skipping instead of silently
                    // dropping the whole subtree.
                    let skipped = refs.iter().filter(|r| !visited.contains(*r)).count();
                    warn!(url = %sitemap_url, skipped, "depth limit reached");
                    outcome.truncated_by_depth += skipped;
                    continue;
                }
                for nested in refs {
                    queue.push((nested, depth + 1));
                }
            }
            Ok(SitemapDoc::Leaf(entries)) => {
                debug!(url = %sitemap_url, urls = entries.len(), "leaf sitemap");
                for entry in entries {
                    if seen_locs.insert(entry.loc.clone()) {
                        outcome.entries.push(entry);
                    }
                }
            }
            Err(e) => {
                outcome.failures.push(SitemapFailure {
                    url: sitemap_url,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        entries = outcome.entries.len(),
        sitemaps_visited = outcome.sitemaps_visited,
        truncated_by_depth = outcome.truncated_by_depth,
        failures = outcome.failures.len(),
        "sitemap expansion complete"
    );

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// URL normalization
// ---------------------------------------------------------------------------

/// Normalize a URL for deduplication and storage.
///
/// Lowercases scheme/host (via `url`'s parser), strips the fragment,
/// and removes tracking query parameters (`utm_*`, `fbclid`, `gclid`,
/// `mc_cid`, `mc_eid`). Remaining query parameters keep their order.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let kept: Vec<(String, String)> = normalized
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        normalized.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &kept {
            serializer.append_pair(k, v);
        }
        normalized.set_query(Some(&serializer.finish()));
    }

    normalized.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with discovery settings.
fn build_client(opts: &DiscoveryOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| SourcebankError::config(format!("failed to build HTTP client: {e}")))
}

/// Fetch a URL as text, enforcing the sitemap size cap.
async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await.map_err(|e| {
        SourcebankError::from(DiscoveryError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DiscoveryError::Network {
            url: url.to_string(),
            message: format!("HTTP {status}"),
        }
        .into());
    }

    if let Some(len) = response.content_length() {
        if len > MAX_SITEMAP_BYTES {
            return Err(DiscoveryError::MalformedSitemap {
                url: url.to_string(),
                message: format!("document too large ({len} bytes, max {MAX_SITEMAP_BYTES})"),
            }
            .into());
        }
    }

    response.text().await.map_err(|e| {
        DiscoveryError::Network {
            url: url.to_string(),
            message: format!("failed to read body: {e}"),
        }
        .into()
    })
}
