//! sourcebank CLI — trusted-source ingestion pipeline.
//!
//! Registers authority domains, expands their sitemaps, and drives the
//! scrape → extract → convert pipeline that turns raw HTML into
//! citation-ready, chunked Markdown.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
