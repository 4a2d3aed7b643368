//! sourcebank HTTP server — the pipeline's external interface.

mod error;
mod handlers;
mod routes;

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

use sourcebank_core::Pipeline;
use sourcebank_shared::{expand_path, load_config};
use sourcebank_storage::Storage;

/// Shared state handed to every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// sourcebank — trusted-source ingestion pipeline server.
#[derive(Parser)]
#[command(name = "sourcebank-server", version)]
struct Args {
    /// Address to bind, overriding the config file.
    #[arg(long, env = "SOURCEBANK_ADDR")]
    addr: Option<String>,

    /// Database path, overriding the config file.
    #[arg(long, env = "SOURCEBANK_DB")]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config().wrap_err("loading config")?;

    let db_path = expand_path(args.db.as_deref().unwrap_or(&config.defaults.db_path))?;
    let addr = args
        .addr
        .clone()
        .unwrap_or_else(|| config.defaults.listen_addr.clone());

    let storage = Storage::open(&db_path).await.wrap_err("opening database")?;
    let pipeline = Pipeline::new(storage, config)?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };
    let router = routes::create_router(state);

    tracing::info!(%addr, db = %db_path.display(), "sourcebank server listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, router).await.wrap_err("serving")?;

    Ok(())
}
