//! API endpoint handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use sourcebank_core::{
    ConvertSummary, CrawlOutcome, DomainRegistration, ExtractSummary, ProcessOutcome,
    RegisterOptions, ScrapeSummary,
};
use sourcebank_shared::{
    Domain, DomainId, ExtractedContent, MarkdownContent, PipelineStatus, SourcebankError, UrlId,
    UrlRecord,
};
use sourcebank_storage::StatusReport;

use crate::AppState;
use crate::error::ApiError;

/// Health check endpoint for container orchestration.
pub(crate) async fn health() -> impl IntoResponse {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

/// Body for `POST /domains`.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateDomainBody {
    pub root_url: String,
    #[serde(default)]
    pub strategy_key: Option<String>,
    #[serde(default)]
    pub path_filter: Option<String>,
    #[serde(default)]
    pub keyword_filters: Vec<String>,
    #[serde(default)]
    pub rate_limit_ms: Option<u64>,
}

/// Register a trusted domain and run sitemap discovery.
/// `409` on a duplicate host, `422` when discovery fails.
pub(crate) async fn create_domain(
    State(state): State<AppState>,
    Json(body): Json<CreateDomainBody>,
) -> Result<(StatusCode, Json<DomainRegistration>), ApiError> {
    let opts = RegisterOptions {
        strategy_key: body.strategy_key,
        path_filter: body.path_filter,
        keyword_filters: body.keyword_filters,
        rate_limit_ms: body.rate_limit_ms,
    };
    let registration = state.pipeline.register_domain(&body.root_url, opts).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

pub(crate) async fn list_domains(
    State(state): State<AppState>,
) -> Result<Json<Vec<Domain>>, ApiError> {
    Ok(Json(state.pipeline.storage().list_domains().await?))
}

pub(crate) async fn get_domain(
    State(state): State<AppState>,
    Path(domain_id): Path<DomainId>,
) -> Result<Json<Domain>, ApiError> {
    let domain = state
        .pipeline
        .storage()
        .get_domain(domain_id)
        .await?
        .ok_or_else(|| SourcebankError::NotFound(format!("domain {domain_id}")))?;
    Ok(Json(domain))
}

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct CrawlBody {
    pub domain_id: DomainId,
}

/// Expand the domain's sitemaps and upsert URL records.
pub(crate) async fn crawl(
    State(state): State<AppState>,
    Json(body): Json<CrawlBody>,
) -> Result<Json<CrawlOutcome>, ApiError> {
    Ok(Json(state.pipeline.crawl(body.domain_id).await?))
}

// ---------------------------------------------------------------------------
// Stage operations
// ---------------------------------------------------------------------------

pub(crate) async fn scrape(
    State(state): State<AppState>,
    Path(url_id): Path<UrlId>,
) -> Result<Json<ScrapeSummary>, ApiError> {
    Ok(Json(state.pipeline.scrape_url(url_id).await?))
}

pub(crate) async fn extract(
    State(state): State<AppState>,
    Path(url_id): Path<UrlId>,
) -> Result<Json<ExtractSummary>, ApiError> {
    Ok(Json(state.pipeline.extract_url(url_id).await?))
}

pub(crate) async fn convert(
    State(state): State<AppState>,
    Path(url_id): Path<UrlId>,
) -> Result<Json<ConvertSummary>, ApiError> {
    Ok(Json(state.pipeline.convert_url(url_id).await?))
}

// ---------------------------------------------------------------------------
// Batch processing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessBody {
    pub url_ids: Vec<UrlId>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Run the full pipeline per URL; one URL's failure never aborts the
/// rest. Returns a complete per-URL status report.
pub(crate) async fn process(
    State(state): State<AppState>,
    Json(body): Json<ProcessBody>,
) -> Result<Json<Vec<ProcessOutcome>>, ApiError> {
    Ok(Json(
        state.pipeline.process(body.url_ids, body.limit).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RetryBody {
    pub domain_id: DomainId,
}

#[derive(Debug, Serialize)]
pub(crate) struct RetryResponse {
    pub reset: u64,
}

/// Reset the domain's fetch failures to `discovered`.
pub(crate) async fn retry(
    State(state): State<AppState>,
    Json(body): Json<RetryBody>,
) -> Result<Json<RetryResponse>, ApiError> {
    let reset = state.pipeline.retry_failed(body.domain_id).await?;
    Ok(Json(RetryResponse { reset }))
}

// ---------------------------------------------------------------------------
// Status & listing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct StatusParams {
    pub domain_id: Option<DomainId>,
}

/// Per-stage URL counts and recent failures.
pub(crate) async fn status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.pipeline.pipeline_status(params.domain_id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListUrlsParams {
    pub domain_id: DomainId,
    pub status: Option<String>,
    pub limit: Option<u64>,
}

pub(crate) async fn list_urls(
    State(state): State<AppState>,
    Query(params): Query<ListUrlsParams>,
) -> Result<Json<Vec<UrlRecord>>, ApiError> {
    let status = match params.status.as_deref() {
        Some(s) => Some(PipelineStatus::parse(s).ok_or_else(|| {
            SourcebankError::validation(format!("unknown status {s:?}"))
        })?),
        None => None,
    };
    let urls = state
        .pipeline
        .storage()
        .list_urls(params.domain_id, status, params.limit.unwrap_or(100))
        .await?;
    Ok(Json(urls))
}

// ---------------------------------------------------------------------------
// Artifact inspection
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct RawContentView {
    pub url_id: UrlId,
    pub version: i64,
    pub http_status: u16,
    pub content_type: Option<String>,
    pub content_hash: String,
    pub size_bytes: usize,
    pub body_head: String,
}

/// Inspect the active raw content for a URL (head of body only).
pub(crate) async fn view_raw(
    State(state): State<AppState>,
    Path(url_id): Path<UrlId>,
) -> Result<Json<RawContentView>, ApiError> {
    let raw = state
        .pipeline
        .storage()
        .get_active_raw_content(url_id)
        .await?
        .ok_or_else(|| SourcebankError::NotFound(format!("raw content for url {url_id}")))?;

    let head_len = raw.bytes.len().min(1024);
    Ok(Json(RawContentView {
        url_id: raw.url_id,
        version: raw.version,
        http_status: raw.http_status,
        content_type: raw.content_type,
        content_hash: raw.content_hash,
        size_bytes: raw.bytes.len(),
        body_head: String::from_utf8_lossy(&raw.bytes[..head_len]).into_owned(),
    }))
}

pub(crate) async fn view_extracted(
    State(state): State<AppState>,
    Path(url_id): Path<UrlId>,
) -> Result<Json<ExtractedContent>, ApiError> {
    let extracted = state
        .pipeline
        .storage()
        .get_extracted_content(url_id)
        .await?
        .ok_or_else(|| SourcebankError::NotFound(format!("extracted content for url {url_id}")))?;
    Ok(Json(extracted))
}

pub(crate) async fn view_markdown(
    State(state): State<AppState>,
    Path(url_id): Path<UrlId>,
) -> Result<Json<MarkdownContent>, ApiError> {
    let markdown = state
        .pipeline
        .storage()
        .get_markdown_content(url_id)
        .await?
        .ok_or_else(|| SourcebankError::NotFound(format!("markdown content for url {url_id}")))?;
    Ok(Json(markdown))
}
