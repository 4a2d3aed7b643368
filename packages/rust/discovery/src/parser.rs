//! Sitemap XML parser.
//!
//! A sitemap document is either a **sitemap index** (`<sitemapindex>` with
//! `<sitemap>` children referencing other sitemaps) or a **leaf sitemap**
//! (`<urlset>` with `<url>` children carrying page locations). Both
//! namespaced (`http://www.sitemaps.org/schemas/sitemap/0.9`) and
//! un-namespaced documents occur in the wild and must parse.

use quick_xml::Reader;
use quick_xml::events::Event;

use sourcebank_shared::{DiscoveryError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A page entry from a leaf sitemap with its optional metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub priority: Option<f64>,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
}

/// Parsed classification of a sitemap document.
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDoc {
    /// An index of other sitemaps: recurse into each location.
    Index(Vec<String>),
    /// A leaf sitemap: collect the page entries.
    Leaf(Vec<SitemapEntry>),
}

impl SitemapDoc {
    /// Number of references/entries in the document.
    pub fn len(&self) -> usize {
        match self {
            Self::Index(refs) => refs.len(),
            Self::Leaf(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Element we are currently collecting text for, within an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Loc,
    Priority,
    Lastmod,
    Changefreq,
}

/// Parse a sitemap document, distinguishing index from leaf.
///
/// `<sitemap>` entries mark an index (recurse), `<url>` entries mark a
/// leaf (collect). A document with neither is treated as an empty leaf;
/// XML syntax errors are reported as [`DiscoveryError::MalformedSitemap`].
pub fn parse_sitemap(xml: &str, source_url: &str) -> Result<SitemapDoc> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut index_refs: Vec<String> = Vec::new();
    let mut entries: Vec<SitemapEntry> = Vec::new();

    // Whether the cursor is inside <sitemap> or <url>, and which field.
    let mut in_sitemap = false;
    let mut in_url = false;
    let mut field: Option<Field> = None;
    let mut current = SitemapEntry {
        loc: String::new(),
        priority: None,
        lastmod: None,
        changefreq: None,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                match e.local_name().as_ref() {
                    b"sitemap" => in_sitemap = true,
                    b"url" => in_url = true,
                    b"loc" if in_sitemap || in_url => field = Some(Field::Loc),
                    b"priority" if in_url => field = Some(Field::Priority),
                    b"lastmod" if in_url => field = Some(Field::Lastmod),
                    b"changefreq" if in_url => field = Some(Field::Changefreq),
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(source_url, e))?
                    .trim()
                    .to_string();
                if text.is_empty() {
                    continue;
                }
                match field {
                    Some(Field::Loc) => current.loc = text,
                    Some(Field::Priority) => current.priority = text.parse().ok(),
                    Some(Field::Lastmod) => current.lastmod = Some(text),
                    Some(Field::Changefreq) => current.changefreq = Some(text),
                    None => {}
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"sitemap" => {
                    in_sitemap = false;
                    if !current.loc.is_empty() {
                        index_refs.push(std::mem::take(&mut current.loc));
                    }
                    current = empty_entry();
                }
                b"url" => {
                    in_url = false;
                    if !current.loc.is_empty() {
                        entries.push(std::mem::replace(&mut current, empty_entry()));
                    } else {
                        current = empty_entry();
                    }
                }
                b"loc" | b"priority" | b"lastmod" | b"changefreq" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(source_url, e)),
        }
    }

    // <sitemap> entries win the classification: a document mixing both
    // is treated as an index so no referenced sitemap is lost.
    if !index_refs.is_empty() {
        Ok(SitemapDoc::Index(index_refs))
    } else {
        Ok(SitemapDoc::Leaf(entries))
    }
}

fn empty_entry() -> SitemapEntry {
    SitemapEntry {
        loc: String::new(),
        priority: None,
        lastmod: None,
        changefreq: None,
    }
}

fn malformed(url: &str, e: impl std::fmt::Display) -> sourcebank_shared::SourcebankError {
    DiscoveryError::MalformedSitemap {
        url: url.to_string(),
        message: e.to_string(),
    }
    .into()
}

/// Quick check whether a response body looks like XML at all, used when
/// probing conventional sitemap locations.
pub fn looks_like_xml(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with("<?xml") || head.starts_with("<sitemapindex") || head.starts_with("<urlset")
}
