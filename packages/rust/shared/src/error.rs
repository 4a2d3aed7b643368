//! Error types for sourcebank.
//!
//! Library crates use [`SourcebankError`] via `thiserror`.
//! App crates (cli/server) wrap this with `color-eyre` or map it to
//! HTTP status codes.

use std::path::PathBuf;

use crate::types::{PipelineStatus, StageOp};

/// Top-level error type for all sourcebank operations.
#[derive(Debug, thiserror::Error)]
pub enum SourcebankError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Sitemap discovery failure: no sitemap found or a malformed index.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Fetch-stage failure (network, timeout, non-2xx, oversize).
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Extraction-stage failure (empty content, unrecoverable encoding).
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Conversion-stage failure (structurally invalid block tree).
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// A stage was attempted out of pipeline order.
    #[error("stage order violation: cannot run {op} from status {from}")]
    StageOrder { from: PipelineStatus, op: StageOp },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique record already exists (e.g. registering a known domain).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Sitemap discovery failures.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Neither robots.txt nor any conventional location yielded a sitemap.
    #[error("no sitemap found for {host}")]
    NoSitemap { host: String },

    /// A sitemap document could not be parsed as XML.
    #[error("malformed sitemap at {url}: {message}")]
    MalformedSitemap { url: String, message: String },

    /// Network failure while probing or fetching sitemaps.
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

/// Fetch-stage failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network-level failure (connect, reset, DNS). Retryable.
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    /// Request exceeded the configured timeout. Retryable.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-2xx response. Retryable only for 5xx.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Response body exceeded the configured size cap.
    #[error("response for {url} exceeds {max_bytes} bytes")]
    TooLarge { url: String, max_bytes: u64 },

    /// Response was not HTML.
    #[error("non-HTML content type {content_type:?} for {url}")]
    NotHtml {
        url: String,
        content_type: Option<String>,
    },
}

impl FetchError {
    /// Whether a retry can plausibly succeed (5xx, timeout, connection
    /// errors). 4xx and content problems are final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::TooLarge { .. } | Self::NotHtml { .. } => false,
        }
    }
}

/// Extraction-stage failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The block sequence fell below the minimum character threshold.
    #[error("extracted content below {min_chars} chars ({found} found)")]
    EmptyContent { min_chars: usize, found: usize },

    /// No decodable text could be produced from the raw bytes.
    #[error("unrecoverable encoding: {message}")]
    Encoding { message: String },

    /// The HTML could not be processed at all.
    #[error("parse failure: {message}")]
    Parse { message: String },
}

/// Conversion-stage failures.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// A table row's cell count disagrees with the table's header.
    #[error("table row {row} has {found} cells, header has {expected}")]
    TableShape {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// The block sequence was empty.
    #[error("no blocks to convert")]
    NoBlocks,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SourcebankError>;

impl SourcebankError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The pipeline status to record when this error aborts a stage, if
    /// it maps to a stage failure at all.
    pub fn failure_status(&self) -> Option<PipelineStatus> {
        match self {
            Self::Fetch(_) => Some(PipelineStatus::FailedAtScrape),
            Self::Extraction(_) => Some(PipelineStatus::FailedAtExtract),
            Self::Conversion(_) => Some(PipelineStatus::FailedAtConvert),
            _ => None,
        }
    }
}
