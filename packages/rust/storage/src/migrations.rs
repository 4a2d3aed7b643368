//! SQL migration definitions for the sourcebank database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: domains, urls, raw/extracted/markdown content, jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Registered trusted-source domains
CREATE TABLE IF NOT EXISTS domains (
    id                   TEXT PRIMARY KEY,
    host                 TEXT NOT NULL UNIQUE,
    root_url             TEXT NOT NULL,
    status               TEXT NOT NULL DEFAULT 'active',
    sitemap_urls         TEXT NOT NULL DEFAULT '[]',
    strategy_key         TEXT,
    path_filter          TEXT,
    keyword_filters      TEXT NOT NULL DEFAULT '[]',
    rate_limit_ms        INTEGER NOT NULL DEFAULT 1500,
    crawl_frequency_days INTEGER NOT NULL DEFAULT 7,
    last_crawled_at      TEXT,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

-- Discovered page URLs with pipeline status
CREATE TABLE IF NOT EXISTS urls (
    id            TEXT PRIMARY KEY,
    domain_id     TEXT NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
    url           TEXT NOT NULL,
    sitemap_url   TEXT,
    priority      REAL,
    lastmod       TEXT,
    changefreq    TEXT,
    discovered_at TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'discovered',
    error_message TEXT,
    scraped_at    TEXT,
    UNIQUE(domain_id, url)
);

CREATE INDEX IF NOT EXISTS idx_urls_domain ON urls(domain_id);
CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);

-- Raw fetched bytes; the highest version per URL is the active one
CREATE TABLE IF NOT EXISTS raw_content (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id       TEXT NOT NULL REFERENCES urls(id) ON DELETE CASCADE,
    version      INTEGER NOT NULL,
    bytes        BLOB NOT NULL,
    content_hash TEXT NOT NULL,
    content_type TEXT,
    http_status  INTEGER NOT NULL,
    fetched_at   TEXT NOT NULL,
    UNIQUE(url_id, version)
);

CREATE INDEX IF NOT EXISTS idx_raw_content_hash ON raw_content(content_hash);

-- Structured blocks + metadata, one row per (url, raw version)
CREATE TABLE IF NOT EXISTS extracted_content (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id              TEXT NOT NULL REFERENCES urls(id) ON DELETE CASCADE,
    raw_content_version INTEGER NOT NULL,
    blocks              TEXT NOT NULL,
    title               TEXT,
    author              TEXT,
    published_date      TEXT,
    structure_score     REAL NOT NULL,
    strategy_used       TEXT NOT NULL,
    extracted_at        TEXT NOT NULL,
    UNIQUE(url_id, raw_content_version)
);

-- Converted markdown + chunks, one row per extraction
CREATE TABLE IF NOT EXISTS markdown_content (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    extracted_content_id INTEGER NOT NULL UNIQUE
                         REFERENCES extracted_content(id) ON DELETE CASCADE,
    markdown             TEXT NOT NULL,
    chunks               TEXT NOT NULL,
    converted_at         TEXT NOT NULL
);

-- Batch job bookkeeping
CREATE TABLE IF NOT EXISTS jobs (
    id            TEXT PRIMARY KEY,
    domain_id     TEXT REFERENCES domains(id) ON DELETE SET NULL,
    job_type      TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'running',
    total         INTEGER NOT NULL DEFAULT 0,
    processed     INTEGER NOT NULL DEFAULT 0,
    failed        INTEGER NOT NULL DEFAULT 0,
    limit_count   INTEGER,
    started_at    TEXT NOT NULL,
    completed_at  TEXT,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_domain ON jobs(domain_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
