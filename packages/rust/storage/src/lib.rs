//! libSQL storage layer for the content pipeline.
//!
//! The [`Storage`] struct wraps a local libSQL database holding domain
//! registrations, discovered URLs with their pipeline status, and the
//! per-stage content artifacts. Each stage writes its own artifact
//! exactly once per content version with overwrite semantics, so the
//! only concurrency primitive needed is the per-record atomic upsert.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Value, params};

use sourcebank_shared::{
    Chunk, ContentBlock, Domain, DomainId, DomainStatus, ExtractedContent, Job, JobStatus,
    JobType, MarkdownContent, PipelineStatus, RawContent, Result, SourcebankError, UrlId,
    UrlRecord,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// Per-stage URL counts plus recent failures, for status reporting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatusReport {
    pub counts: Vec<(String, u64)>,
    pub recent_failures: Vec<FailureEntry>,
}

/// One failed URL with its stage and reason.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureEntry {
    pub url_id: UrlId,
    pub url: String,
    pub status: String,
    pub error_message: Option<String>,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SourcebankError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SourcebankError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Domains
    // -----------------------------------------------------------------------

    /// Insert a new domain. A duplicate host maps to [`SourcebankError::Duplicate`].
    pub async fn insert_domain(&self, domain: &Domain) -> Result<()> {
        let sitemaps = serde_json::to_string(&domain.sitemap_urls)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        let keywords = serde_json::to_string(&domain.keyword_filters)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO domains (id, host, root_url, status, sitemap_urls, strategy_key,
                                      path_filter, keyword_filters, rate_limit_ms,
                                      crawl_frequency_days, last_crawled_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    domain.id.to_string(),
                    domain.host.as_str(),
                    domain.root_url.as_str(),
                    domain.status.as_str(),
                    sitemaps.as_str(),
                    domain.strategy_key.as_deref(),
                    domain.path_filter.as_deref(),
                    keywords.as_str(),
                    domain.rate_limit_ms as i64,
                    domain.crawl_frequency_days as i64,
                    domain.last_crawled_at.map(|t| t.to_rfc3339()),
                    domain.created_at.to_rfc3339(),
                    domain.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    SourcebankError::Duplicate(format!("domain {}", domain.host))
                } else {
                    SourcebankError::Storage(msg)
                }
            })?;
        Ok(())
    }

    /// Get a domain by id.
    pub async fn get_domain(&self, id: DomainId) -> Result<Option<Domain>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, host, root_url, status, sitemap_urls, strategy_key, path_filter,
                        keyword_filters, rate_limit_ms, crawl_frequency_days, last_crawled_at,
                        created_at, updated_at
                 FROM domains WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => Ok(Some(parse_domain(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a domain by its unique host.
    pub async fn get_domain_by_host(&self, host: &str) -> Result<Option<Domain>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, host, root_url, status, sitemap_urls, strategy_key, path_filter,
                        keyword_filters, rate_limit_ms, crawl_frequency_days, last_crawled_at,
                        created_at, updated_at
                 FROM domains WHERE host = ?1",
                params![host],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => Ok(Some(parse_domain(&row)?)),
            None => Ok(None),
        }
    }

    /// List all registered domains, oldest first.
    pub async fn list_domains(&self) -> Result<Vec<Domain>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, host, root_url, status, sitemap_urls, strategy_key, path_filter,
                        keyword_filters, rate_limit_ms, crawl_frequency_days, last_crawled_at,
                        created_at, updated_at
                 FROM domains ORDER BY created_at",
                params![],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        let mut domains = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            domains.push(parse_domain(&row)?);
        }
        Ok(domains)
    }

    /// Refresh a domain's sitemap locations and crawl timestamp.
    pub async fn mark_domain_crawled(&self, id: DomainId, sitemap_urls: &[String]) -> Result<()> {
        let sitemaps = serde_json::to_string(sitemap_urls)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE domains SET sitemap_urls = ?2, last_crawled_at = ?3, updated_at = ?3
                 WHERE id = ?1",
                params![id.to_string(), sitemaps.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // URLs
    // -----------------------------------------------------------------------

    /// Insert a discovered URL if it is not already known.
    /// Returns `true` when a new record was created.
    pub async fn upsert_url(&self, record: &UrlRecord) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT INTO urls (id, domain_id, url, sitemap_url, priority, lastmod,
                                   changefreq, discovered_at, status, error_message, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(domain_id, url) DO NOTHING",
                params![
                    record.id.to_string(),
                    record.domain_id.to_string(),
                    record.url.as_str(),
                    record.sitemap_url.as_deref(),
                    record.priority,
                    record.lastmod.as_deref(),
                    record.changefreq.as_deref(),
                    record.discovered_at.to_rfc3339(),
                    record.status.as_str(),
                    record.error_message.as_deref(),
                    record.scraped_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Get a URL record by id.
    pub async fn get_url(&self, id: UrlId) -> Result<Option<UrlRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, domain_id, url, sitemap_url, priority, lastmod, changefreq,
                        discovered_at, status, error_message, scraped_at
                 FROM urls WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => Ok(Some(parse_url(&row)?)),
            None => Ok(None),
        }
    }

    /// List URLs for a domain, optionally filtered by status.
    pub async fn list_urls(
        &self,
        domain_id: DomainId,
        status: Option<PipelineStatus>,
        limit: u64,
    ) -> Result<Vec<UrlRecord>> {
        let mut urls = Vec::new();
        let mut rows = match status {
            Some(status) => self
                .conn
                .query(
                    "SELECT id, domain_id, url, sitemap_url, priority, lastmod, changefreq,
                            discovered_at, status, error_message, scraped_at
                     FROM urls WHERE domain_id = ?1 AND status = ?2
                     ORDER BY discovered_at LIMIT ?3",
                    params![domain_id.to_string(), status.as_str(), limit as i64],
                )
                .await,
            None => self
                .conn
                .query(
                    "SELECT id, domain_id, url, sitemap_url, priority, lastmod, changefreq,
                            discovered_at, status, error_message, scraped_at
                     FROM urls WHERE domain_id = ?1
                     ORDER BY discovered_at LIMIT ?2",
                    params![domain_id.to_string(), limit as i64],
                )
                .await,
        }
        .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            urls.push(parse_url(&row)?);
        }
        Ok(urls)
    }

    /// Record a URL's new pipeline status. A successful stage clears the
    /// failure message; a failed one records it.
    pub async fn update_url_status(
        &self,
        id: UrlId,
        status: PipelineStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let scraped_at = matches!(status, PipelineStatus::Scraped)
            .then(|| Utc::now().to_rfc3339());
        self.conn
            .execute(
                "UPDATE urls SET status = ?2, error_message = ?3,
                        scraped_at = COALESCE(?4, scraped_at)
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    status.as_str(),
                    error_message,
                    scraped_at
                ],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Per-stage URL counts and recent failures, optionally per domain.
    pub async fn status_report(&self, domain_id: Option<DomainId>) -> Result<StatusReport> {
        let mut report = StatusReport::default();

        let mut rows = match domain_id {
            Some(id) => self
                .conn
                .query(
                    "SELECT status, COUNT(*) FROM urls WHERE domain_id = ?1 GROUP BY status",
                    params![id.to_string()],
                )
                .await,
            None => self
                .conn
                .query("SELECT status, COUNT(*) FROM urls GROUP BY status", params![])
                .await,
        }
        .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            let status: String = row
                .get(0)
                .map_err(|e| SourcebankError::Storage(e.to_string()))?;
            let count: u64 = row
                .get::<i64>(1)
                .map_err(|e| SourcebankError::Storage(e.to_string()))? as u64;
            report.counts.push((status, count));
        }
        report.counts.sort();

        let mut rows = match domain_id {
            Some(id) => self
                .conn
                .query(
                    "SELECT id, url, status, error_message FROM urls
                     WHERE domain_id = ?1 AND status LIKE 'failed_at_%'
                     ORDER BY rowid DESC LIMIT 20",
                    params![id.to_string()],
                )
                .await,
            None => self
                .conn
                .query(
                    "SELECT id, url, status, error_message FROM urls
                     WHERE status LIKE 'failed_at_%'
                     ORDER BY rowid DESC LIMIT 20",
                    params![],
                )
                .await,
        }
        .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| SourcebankError::Storage(e.to_string()))?;
            report.recent_failures.push(FailureEntry {
                url_id: id
                    .parse()
                    .map_err(|e| SourcebankError::Storage(format!("bad url id: {e}")))?,
                url: row
                    .get(1)
                    .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                status: row
                    .get(2)
                    .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                error_message: opt_text(&row, 3),
            });
        }

        Ok(report)
    }

    /// Reset fetch-stage failures back to `discovered` for a manual
    /// retry sweep. Returns how many URLs were reset.
    pub async fn reset_failed_scrapes(&self, domain_id: DomainId) -> Result<u64> {
        let changed = self
            .conn
            .execute(
                "UPDATE urls SET status = 'discovered', error_message = NULL
                 WHERE domain_id = ?1 AND status = 'failed_at_scrape'",
                params![domain_id.to_string()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Raw content
    // -----------------------------------------------------------------------

    /// Persist fetched bytes as the next content version for a URL and
    /// invalidate downstream artifacts in the same transaction.
    pub async fn insert_raw_content(
        &self,
        url_id: UrlId,
        bytes: &[u8],
        content_type: Option<&str>,
        http_status: u16,
    ) -> Result<(i64, i64)> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        let mut rows = tx
            .query(
                "SELECT COALESCE(MAX(version), 0) FROM raw_content WHERE url_id = ?1",
                params![url_id.to_string()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        let version: i64 = match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => row
                .get::<i64>(0)
                .map_err(|e| SourcebankError::Storage(e.to_string()))?,
            None => 0,
        } + 1;

        let content_hash = sha256_hex(bytes);
        tx.execute(
            "INSERT INTO raw_content (url_id, version, bytes, content_hash, content_type,
                                      http_status, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                url_id.to_string(),
                version,
                bytes.to_vec(),
                content_hash.as_str(),
                content_type,
                http_status as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        let raw_id = tx.last_insert_rowid();

        // A new content version invalidates everything downstream.
        tx.execute(
            "DELETE FROM markdown_content WHERE extracted_content_id IN
               (SELECT id FROM extracted_content WHERE url_id = ?1)",
            params![url_id.to_string()],
        )
        .await
        .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        tx.execute(
            "DELETE FROM extracted_content WHERE url_id = ?1",
            params![url_id.to_string()],
        )
        .await
        .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        Ok((raw_id, version))
    }

    /// Get the active (highest-version) raw content for a URL.
    pub async fn get_active_raw_content(&self, url_id: UrlId) -> Result<Option<RawContent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url_id, version, bytes, content_hash, content_type, http_status,
                        fetched_at
                 FROM raw_content WHERE url_id = ?1 ORDER BY version DESC LIMIT 1",
                params![url_id.to_string()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => {
                let id_text: String = row
                    .get(1)
                    .map_err(|e| SourcebankError::Storage(e.to_string()))?;
                Ok(Some(RawContent {
                    id: row
                        .get(0)
                        .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                    url_id: id_text
                        .parse()
                        .map_err(|e| SourcebankError::Storage(format!("bad url id: {e}")))?,
                    version: row
                        .get(2)
                        .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                    bytes: row
                        .get::<Vec<u8>>(3)
                        .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                    content_hash: get_text(&row, 4)?,
                    content_type: opt_text(&row, 5),
                    http_status: row
                        .get::<i64>(6)
                        .map_err(|e| SourcebankError::Storage(e.to_string()))?
                        as u16,
                    fetched_at: parse_ts(&get_text(&row, 7)?)?,
                }))
            }
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Extracted content
    // -----------------------------------------------------------------------

    /// Persist an extraction for `(url, raw version)`, overwriting any
    /// previous one and invalidating its markdown.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_extracted_content(
        &self,
        url_id: UrlId,
        raw_content_version: i64,
        blocks: &[ContentBlock],
        title: Option<&str>,
        author: Option<&str>,
        published_date: Option<&str>,
        structure_score: f64,
        strategy_used: &str,
    ) -> Result<i64> {
        let blocks_json = serde_json::to_string(blocks)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO extracted_content
                   (url_id, raw_content_version, blocks, title, author, published_date,
                    structure_score, strategy_used, extracted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(url_id, raw_content_version) DO UPDATE SET
                   blocks = excluded.blocks,
                   title = excluded.title,
                   author = excluded.author,
                   published_date = excluded.published_date,
                   structure_score = excluded.structure_score,
                   strategy_used = excluded.strategy_used,
                   extracted_at = excluded.extracted_at",
                params![
                    url_id.to_string(),
                    raw_content_version,
                    blocks_json.as_str(),
                    title,
                    author,
                    published_date,
                    structure_score,
                    strategy_used,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM extracted_content WHERE url_id = ?1 AND raw_content_version = ?2",
                params![url_id.to_string(), raw_content_version],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        let id: i64 = match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| SourcebankError::Storage(e.to_string()))?,
            None => return Err(SourcebankError::Storage("extracted row vanished".into())),
        };

        // Re-extraction invalidates the previous conversion.
        self.conn
            .execute(
                "DELETE FROM markdown_content WHERE extracted_content_id = ?1",
                params![id],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        Ok(id)
    }

    /// Get the extraction for a URL's active content version.
    pub async fn get_extracted_content(&self, url_id: UrlId) -> Result<Option<ExtractedContent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url_id, raw_content_version, blocks, title, author, published_date,
                        structure_score, strategy_used, extracted_at
                 FROM extracted_content WHERE url_id = ?1
                 ORDER BY raw_content_version DESC LIMIT 1",
                params![url_id.to_string()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => Ok(Some(parse_extracted(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Markdown content
    // -----------------------------------------------------------------------

    /// Persist converted markdown + chunks, overwriting any previous
    /// conversion of the same extraction.
    pub async fn upsert_markdown_content(
        &self,
        extracted_content_id: i64,
        markdown: &str,
        chunks: &[Chunk],
    ) -> Result<i64> {
        let chunks_json = serde_json::to_string(chunks)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO markdown_content (extracted_content_id, markdown, chunks, converted_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(extracted_content_id) DO UPDATE SET
                   markdown = excluded.markdown,
                   chunks = excluded.chunks,
                   converted_at = excluded.converted_at",
                params![
                    extracted_content_id,
                    markdown,
                    chunks_json.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM markdown_content WHERE extracted_content_id = ?1",
                params![extracted_content_id],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| SourcebankError::Storage(e.to_string())),
            None => Err(SourcebankError::Storage("markdown row vanished".into())),
        }
    }

    /// Get the markdown for a URL's active extraction.
    pub async fn get_markdown_content(&self, url_id: UrlId) -> Result<Option<MarkdownContent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT m.id, m.extracted_content_id, m.markdown, m.chunks, m.converted_at
                 FROM markdown_content m
                 JOIN extracted_content e ON e.id = m.extracted_content_id
                 WHERE e.url_id = ?1
                 ORDER BY e.raw_content_version DESC LIMIT 1",
                params![url_id.to_string()],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?
        {
            Some(row) => {
                let chunks_json: String = row
                    .get(3)
                    .map_err(|e| SourcebankError::Storage(e.to_string()))?;
                Ok(Some(MarkdownContent {
                    id: row
                        .get(0)
                        .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                    extracted_content_id: row
                        .get(1)
                        .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                    markdown: row
                        .get(2)
                        .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                    chunks: serde_json::from_str(&chunks_json)
                        .map_err(|e| SourcebankError::Storage(format!("bad chunks json: {e}")))?,
                    converted_at: parse_ts(
                        &row.get::<String>(4)
                            .map_err(|e| SourcebankError::Storage(e.to_string()))?,
                    )?,
                }))
            }
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Create a batch job record.
    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO jobs (id, domain_id, job_type, status, total, processed, failed,
                                   limit_count, started_at, completed_at, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    job.id.as_str(),
                    job.domain_id.map(|d| d.to_string()),
                    job.job_type.as_str(),
                    job.status.as_str(),
                    job.total as i64,
                    job.processed as i64,
                    job.failed as i64,
                    job.limit.map(|l| l as i64),
                    job.started_at.to_rfc3339(),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.error_message.as_deref(),
                ],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Update a running job's progress counters.
    pub async fn update_job_progress(&self, id: &str, processed: u64, failed: u64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE jobs SET processed = ?2, failed = ?3 WHERE id = ?1",
                params![id, processed as i64, failed as i64],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a job completed or failed.
    pub async fn complete_job(
        &self,
        id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE jobs SET status = ?2, completed_at = ?3, error_message = ?4 WHERE id = ?1",
                params![
                    id,
                    status.as_str(),
                    Utc::now().to_rfc3339(),
                    error_message
                ],
            )
            .await
            .map_err(|e| SourcebankError::Storage(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

/// Hex-encoded SHA-256 of raw content bytes.
fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SourcebankError::Storage(format!("bad timestamp {s:?}: {e}")))
}

fn opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    match row.get_value(idx) {
        Ok(Value::Text(s)) => Some(s),
        _ => None,
    }
}

fn opt_real(row: &libsql::Row, idx: i32) -> Option<f64> {
    match row.get_value(idx) {
        Ok(Value::Real(f)) => Some(f),
        Ok(Value::Integer(i)) => Some(i as f64),
        _ => None,
    }
}

fn get_text(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| SourcebankError::Storage(e.to_string()))
}

fn parse_domain(row: &libsql::Row) -> Result<Domain> {
    let status_text = get_text(row, 3)?;
    let sitemaps_json = get_text(row, 4)?;
    let keywords_json = get_text(row, 7)?;

    Ok(Domain {
        id: get_text(row, 0)?
            .parse()
            .map_err(|e| SourcebankError::Storage(format!("bad domain id: {e}")))?,
        host: get_text(row, 1)?,
        root_url: get_text(row, 2)?,
        status: DomainStatus::parse(&status_text)
            .ok_or_else(|| SourcebankError::Storage(format!("bad domain status {status_text:?}")))?,
        sitemap_urls: serde_json::from_str(&sitemaps_json)
            .map_err(|e| SourcebankError::Storage(format!("bad sitemap json: {e}")))?,
        strategy_key: opt_text(row, 5),
        path_filter: opt_text(row, 6),
        keyword_filters: serde_json::from_str(&keywords_json)
            .map_err(|e| SourcebankError::Storage(format!("bad keywords json: {e}")))?,
        rate_limit_ms: row
            .get::<i64>(8)
            .map_err(|e| SourcebankError::Storage(e.to_string()))? as u64,
        crawl_frequency_days: row
            .get::<i64>(9)
            .map_err(|e| SourcebankError::Storage(e.to_string()))? as u32,
        last_crawled_at: opt_text(row, 10).map(|s| parse_ts(&s)).transpose()?,
        created_at: parse_ts(&get_text(row, 11)?)?,
        updated_at: parse_ts(&get_text(row, 12)?)?,
    })
}

fn parse_url(row: &libsql::Row) -> Result<UrlRecord> {
    let status_text = get_text(row, 8)?;
    Ok(UrlRecord {
        id: get_text(row, 0)?
            .parse()
            .map_err(|e| SourcebankError::Storage(format!("bad url id: {e}")))?,
        domain_id: get_text(row, 1)?
            .parse()
            .map_err(|e| SourcebankError::Storage(format!("bad domain id: {e}")))?,
        url: get_text(row, 2)?,
        sitemap_url: opt_text(row, 3),
        priority: opt_real(row, 4),
        lastmod: opt_text(row, 5),
        changefreq: opt_text(row, 6),
        discovered_at: parse_ts(&get_text(row, 7)?)?,
        status: PipelineStatus::parse(&status_text)
            .ok_or_else(|| SourcebankError::Storage(format!("bad status {status_text:?}")))?,
        error_message: opt_text(row, 9),
        scraped_at: opt_text(row, 10).map(|s| parse_ts(&s)).transpose()?,
    })
}

fn parse_extracted(row: &libsql::Row) -> Result<ExtractedContent> {
    let blocks_json = get_text(row, 3)?;
    Ok(ExtractedContent {
        id: row
            .get(0)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?,
        url_id: get_text(row, 1)?
            .parse()
            .map_err(|e| SourcebankError::Storage(format!("bad url id: {e}")))?,
        raw_content_version: row
            .get(2)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?,
        blocks: serde_json::from_str(&blocks_json)
            .map_err(|e| SourcebankError::Storage(format!("bad blocks json: {e}")))?,
        title: opt_text(row, 4),
        author: opt_text(row, 5),
        published_date: opt_text(row, 6),
        structure_score: row
            .get(7)
            .map_err(|e| SourcebankError::Storage(e.to_string()))?,
        strategy_used: get_text(row, 8)?,
        extracted_at: parse_ts(&get_text(row, 9)?)?,
    })
}
