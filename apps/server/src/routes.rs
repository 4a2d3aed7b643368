//! Router configuration for the pipeline API.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Create the main router with all routes.
pub(crate) fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check for container orchestration
        .route("/health", get(handlers::health))
        // Domain registration & inspection
        .route(
            "/domains",
            get(handlers::list_domains).post(handlers::create_domain),
        )
        .route("/domains/:domain_id", get(handlers::get_domain))
        // Sitemap expansion into URL records
        .route("/crawl", post(handlers::crawl))
        // Synchronous single-URL stage operations
        .route("/scrape/:url_id", post(handlers::scrape))
        .route("/extract/:url_id", post(handlers::extract))
        .route("/convert/:url_id", post(handlers::convert))
        // Batch pipeline with per-URL failure isolation
        .route("/process", post(handlers::process))
        // Fetch-failure retry sweep
        .route("/retry", post(handlers::retry))
        // Pipeline status report
        .route("/status", get(handlers::status))
        .route("/urls", get(handlers::list_urls))
        // Artifact inspection views
        .route("/content/raw/:url_id", get(handlers::view_raw))
        .route("/content/extracted/:url_id", get(handlers::view_extracted))
        .route("/content/markdown/:url_id", get(handlers::view_markdown))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
