//! Core domain types for the sourcebank content pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for domain identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub Uuid);

/// A UUID v7 wrapper for URL record identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlId(pub Uuid);

macro_rules! id_impls {
    ($name:ident) => {
        impl $name {
            /// Generate a new time-sortable identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

id_impls!(DomainId);
id_impls!(UrlId);

// ---------------------------------------------------------------------------
// Pipeline state machine
// ---------------------------------------------------------------------------

/// Per-URL pipeline status. Advances monotonically through the success
/// states; the `failed_at_*` states are absorbing for the attempt and
/// only a retry of the same stage (or a re-scrape) leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Discovered,
    Scraped,
    Extracted,
    Converted,
    FailedAtScrape,
    FailedAtExtract,
    FailedAtConvert,
}

/// The three pipeline stage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOp {
    Scrape,
    Extract,
    Convert,
}

impl PipelineStatus {
    /// Whether `op` may legally execute from this status.
    ///
    /// Scrape is re-runnable from any state (a re-scrape starts a new
    /// content version and invalidates downstream artifacts). Extract
    /// requires a scraped artifact; convert requires an extracted one.
    /// Failed states permit retrying exactly the stage that failed.
    pub fn allows(&self, op: StageOp) -> bool {
        match op {
            StageOp::Scrape => true,
            StageOp::Extract => matches!(
                self,
                Self::Scraped | Self::Extracted | Self::Converted | Self::FailedAtExtract
            ),
            StageOp::Convert => {
                matches!(self, Self::Extracted | Self::Converted | Self::FailedAtConvert)
            }
        }
    }

    /// The status recorded after `op` succeeds.
    pub fn after_success(op: StageOp) -> Self {
        match op {
            StageOp::Scrape => Self::Scraped,
            StageOp::Extract => Self::Extracted,
            StageOp::Convert => Self::Converted,
        }
    }

    /// The status recorded after `op` fails.
    pub fn after_failure(op: StageOp) -> Self {
        match op {
            StageOp::Scrape => Self::FailedAtScrape,
            StageOp::Extract => Self::FailedAtExtract,
            StageOp::Convert => Self::FailedAtConvert,
        }
    }

    /// Stable string form used in the database and the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Scraped => "scraped",
            Self::Extracted => "extracted",
            Self::Converted => "converted",
            Self::FailedAtScrape => "failed_at_scrape",
            Self::FailedAtExtract => "failed_at_extract",
            Self::FailedAtConvert => "failed_at_convert",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "scraped" => Some(Self::Scraped),
            "extracted" => Some(Self::Extracted),
            "converted" => Some(Self::Converted),
            "failed_at_scrape" => Some(Self::FailedAtScrape),
            "failed_at_extract" => Some(Self::FailedAtExtract),
            "failed_at_convert" => Some(Self::FailedAtConvert),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for StageOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scrape => "scrape",
            Self::Extract => "extract",
            Self::Convert => "convert",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// Lifecycle status of a registered domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Active,
    Inactive,
    Blocked,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// A registered trusted-source domain with its crawl configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    /// Unique identifier.
    pub id: DomainId,
    /// Lowercased host, unique across domains (e.g. `helsedirektoratet.no`).
    pub host: String,
    /// The URL the domain was registered from.
    pub root_url: String,
    pub status: DomainStatus,
    /// Sitemap locations found at registration (refreshed on re-discovery).
    pub sitemap_urls: Vec<String>,
    /// Extraction strategy key; `None` uses the generic strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_key: Option<String>,
    /// Optional URL path prefix filter applied during crawl.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_filter: Option<String>,
    /// Optional keyword filter: a discovered URL must contain at least
    /// one of these (case-insensitive) to be kept. Empty = keep all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyword_filters: Vec<String>,
    /// Politeness delay between requests to this domain.
    pub rate_limit_ms: u64,
    /// Re-crawl cadence used by the scheduler (informational here).
    pub crawl_frequency_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// UrlRecord
// ---------------------------------------------------------------------------

/// A discovered page URL and its position in the pipeline.
/// Unique per `(domain_id, url)` where `url` is the normalized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: UrlId,
    pub domain_id: DomainId,
    /// Normalized URL (lowercased scheme/host, no fragment, no tracking params).
    pub url: String,
    /// The sitemap this URL was discovered in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,
    /// Sitemap-declared priority, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    /// Sitemap `<lastmod>` kept verbatim to preserve the source format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changefreq: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub status: PipelineStatus,
    /// Last failure reason, cleared on the next successful stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Content artifacts
// ---------------------------------------------------------------------------

/// Raw fetched bytes for a URL. One row per content version; the
/// highest version is the active one.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub id: i64,
    pub url_id: UrlId,
    pub version: i64,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, hex-encoded, for change detection.
    pub content_hash: String,
    pub content_type: Option<String>,
    pub http_status: u16,
    pub fetched_at: DateTime<Utc>,
}

/// Structural role of a content block, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    ListItem { depth: u8, ordered: bool, text: String },
    TableRow { cells: Vec<String> },
}

impl ContentBlock {
    /// The visible text length of this block, used by the minimum-content gate.
    pub fn text_len(&self) -> usize {
        match self {
            Self::Heading { text, .. } | Self::Paragraph { text } => text.chars().count(),
            Self::ListItem { text, .. } => text.chars().count(),
            Self::TableRow { cells } => cells.iter().map(|c| c.chars().count()).sum(),
        }
    }

    /// Whether this block counts as a structural element for scoring
    /// (headings, list items, table rows; plain paragraphs do not).
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Paragraph { .. })
    }
}

/// Clean structured content for one raw content version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub id: i64,
    pub url_id: UrlId,
    pub raw_content_version: i64,
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Fraction of structural elements retained through extraction, in [0,1].
    pub structure_score: f64,
    /// Strategy key that produced this extraction ("generic" for the fallback).
    pub strategy_used: String,
    pub extracted_at: DateTime<Utc>,
}

/// A citation-traceable slice of converted Markdown.
///
/// The range is measured in bytes into the UTF-8 Markdown string so
/// that `markdown[char_start..char_end] == text` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Converted Markdown plus its retrieval chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownContent {
    pub id: i64,
    pub extracted_content_id: i64,
    pub markdown: String,
    pub chunks: Vec<Chunk>,
    pub converted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Kind of batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Discover,
    Scrape,
    Extract,
    Convert,
    Process,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Scrape => "scrape",
            Self::Extract => "extract",
            Self::Convert => "convert",
            Self::Process => "process",
        }
    }
}

/// Lifecycle of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Batch job bookkeeping for `process` and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Human-scannable id, e.g. `process_helsedirektoratet.no_20250115T101500`.
    pub id: String,
    pub domain_id: Option<DomainId>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    /// Test-mode cap on the number of URLs taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
