//! Per-URL HTML fetching with retry, size caps, and politeness limits.
//!
//! The fetcher performs a synchronous GET per URL with a bounded
//! exponential-backoff retry on transient failures (5xx, timeout,
//! connection errors). Non-retryable 4xx responses fail immediately.
//! Oversized responses are aborted mid-stream without buffering the
//! full body. Concurrency is capped per domain and globally; that is a
//! politeness constraint, not a correctness one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, instrument, warn};
use url::Url;

use sourcebank_shared::{FetchConfig, FetchError, Result, SourcebankError};

/// User-Agent string for page fetches.
const USER_AGENT: &str = concat!(
    "sourcebank/",
    env!("CARGO_PKG_VERSION"),
    " (trusted-source ingestion; respectful crawler)"
);

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A successfully fetched page body with its transport metadata.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    /// Raw response bytes, undecoded. Charset handling happens at
    /// extraction time, against these exact bytes.
    pub bytes: Vec<u8>,
    /// The `Content-Type` header verbatim, if present.
    pub content_type: Option<String>,
    pub http_status: u16,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher with per-domain and global concurrency caps.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    global: Arc<Semaphore>,
    per_domain: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Fetcher {
    /// Create a fetcher from the `[fetch]` configuration section.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourcebankError::config(format!("failed to build HTTP client: {e}")))?;

        let global = Arc::new(Semaphore::new(config.global_concurrency));

        Ok(Self {
            client,
            config,
            global,
            per_domain: Mutex::new(HashMap::new()),
        })
    }

    /// Fetch a page, retrying transient failures with exponential backoff.
    ///
    /// `rate_limit_ms` is the registered domain's politeness delay,
    /// applied before the request once the concurrency permits are held.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &Url, rate_limit_ms: u64) -> Result<FetchedPayload> {
        let _global_permit = self
            .global
            .acquire()
            .await
            .map_err(|_| SourcebankError::validation("fetcher shut down"))?;
        let domain_sem = self.domain_semaphore(url).await;
        let _domain_permit = domain_sem
            .acquire()
            .await
            .map_err(|_| SourcebankError::validation("fetcher shut down"))?;

        if rate_limit_ms > 0 {
            tokio::time::sleep(Duration::from_millis(rate_limit_ms)).await;
        }

        let mut backoff = Duration::from_millis(self.config.backoff_base_ms);
        let mut attempt = 1u32;

        loop {
            match self.fetch_once(url).await {
                Ok(payload) => return Ok(payload),
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    warn!(
                        %url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// One GET attempt with streaming size enforcement.
    async fn fetch_once(&self, url: &Url) -> std::result::Result<FetchedPayload, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = &content_type {
            if !is_html_content_type(ct) {
                return Err(FetchError::NotHtml {
                    url: url.to_string(),
                    content_type: content_type.clone(),
                });
            }
        }

        let max = self.config.max_body_bytes;
        if let Some(len) = response.content_length() {
            if len > max {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    max_bytes: max,
                });
            }
        }

        // Stream the body so an oversized response is abandoned as soon
        // as the running total crosses the cap.
        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_reqwest_error(url, e))?;
            if bytes.len() as u64 + chunk.len() as u64 > max {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    max_bytes: max,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(%url, size = bytes.len(), status = status.as_u16(), "page fetched");

        Ok(FetchedPayload {
            bytes,
            content_type,
            http_status: status.as_u16(),
        })
    }

    /// Get or create the politeness semaphore for a URL's host.
    async fn domain_semaphore(&self, url: &Url) -> Arc<Semaphore> {
        let host = url.host_str().unwrap_or("").to_string();
        let mut map = self.per_domain.lock().await;
        map.entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_domain_concurrency)))
            .clone()
    }
}

/// Whether a Content-Type header names an HTML document.
fn is_html_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml+xml")
}

/// Map a reqwest error to the fetch error taxonomy.
fn classify_reqwest_error(url: &Url, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
