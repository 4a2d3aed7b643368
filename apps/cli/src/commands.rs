//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::ProgressBar;
use tracing::info;

use sourcebank_core::{Pipeline, RegisterOptions};
use sourcebank_shared::{
    DomainId, UrlId, config_file_path, expand_path, init_config, load_config,
};
use sourcebank_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// sourcebank — turn trusted authority sites into a citation-ready
/// Markdown knowledge base.
#[derive(Parser)]
#[command(
    name = "sourcebank",
    version,
    about = "Ingest trusted authority domains into quality-scored, chunked Markdown.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path, overriding the config file.
    #[arg(long, global = true, env = "SOURCEBANK_DB")]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Register a trusted domain and discover its sitemaps.
    AddDomain {
        /// Root URL of the domain (e.g. https://www.helsedirektoratet.no).
        root_url: String,

        /// Extraction strategy key (defaults to host-based lookup).
        #[arg(long)]
        strategy: Option<String>,

        /// Keep only URLs whose path starts with this prefix.
        #[arg(long)]
        path_filter: Option<String>,

        /// Keep only URLs containing at least one keyword (comma-separated).
        #[arg(long)]
        keywords: Option<String>,

        /// Politeness delay between requests in milliseconds.
        #[arg(long)]
        rate_limit_ms: Option<u64>,
    },

    /// Expand a domain's sitemaps into URL records.
    Crawl {
        /// Domain id (see `sourcebank domains`).
        domain_id: DomainId,
    },

    /// List registered domains.
    Domains,

    /// Fetch one URL's raw HTML.
    Scrape { url_id: UrlId },

    /// Extract structured content from one URL's raw HTML.
    Extract { url_id: UrlId },

    /// Convert one URL's extraction to chunked Markdown.
    Convert { url_id: UrlId },

    /// Run the full pipeline for a domain's pending URLs.
    Process {
        domain_id: DomainId,

        /// Cap the number of URLs processed (test mode).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show per-stage URL counts and recent failures.
    Status {
        /// Restrict to one domain.
        #[arg(long)]
        domain_id: Option<DomainId>,
    },

    /// Reset a domain's fetch failures for re-processing.
    Retry { domain_id: DomainId },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file.
    Init,
    /// Print the effective configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize tracing from the CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sourcebank={default_level}")));

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command routing
// ---------------------------------------------------------------------------

/// Execute the parsed CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Config { action } => return run_config(action),
        _ => {}
    }

    let config = load_config()?;
    let db_path = expand_path(cli.db.as_deref().unwrap_or(&config.defaults.db_path))?;
    let storage = Storage::open(&db_path).await?;
    let pipeline = Pipeline::new(storage, config)?;

    match cli.command {
        Command::AddDomain {
            root_url,
            strategy,
            path_filter,
            keywords,
            rate_limit_ms,
        } => {
            let opts = RegisterOptions {
                strategy_key: strategy,
                path_filter,
                keyword_filters: keywords
                    .map(|k| k.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
                rate_limit_ms,
            };
            let registration = pipeline.register_domain(&root_url, opts).await?;
            println!(
                "registered {} ({})",
                registration.domain.host, registration.domain.id
            );
            for sitemap in &registration.sitemaps {
                println!("  sitemap: {sitemap}");
            }
        }

        Command::Crawl { domain_id } => {
            let spinner = spinner("expanding sitemaps");
            let outcome = pipeline.crawl(domain_id).await?;
            spinner.finish_and_clear();

            println!(
                "discovered {} urls: {} new, {} known, {} filtered",
                outcome.discovered, outcome.new, outcome.known, outcome.filtered
            );
            if outcome.truncated_by_depth > 0 {
                println!(
                    "warning: {} sitemap references skipped at the depth limit",
                    outcome.truncated_by_depth
                );
            }
            for (url, reason) in &outcome.failures {
                println!("warning: sitemap {url} failed: {reason}");
            }
        }

        Command::Domains => {
            for domain in pipeline.storage().list_domains().await? {
                println!(
                    "{}  {}  strategy={}  last_crawl={}",
                    domain.id,
                    domain.host,
                    domain.strategy_key.as_deref().unwrap_or("generic"),
                    domain
                        .last_crawled_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into()),
                );
            }
        }

        Command::Scrape { url_id } => {
            let summary = pipeline.scrape_url(url_id).await?;
            println!(
                "scraped version {} ({} bytes, HTTP {})",
                summary.version, summary.size_bytes, summary.http_status
            );
        }

        Command::Extract { url_id } => {
            let summary = pipeline.extract_url(url_id).await?;
            println!(
                "extracted {} blocks (score {:.2}, strategy {})",
                summary.block_count, summary.structure_score, summary.strategy_used
            );
            if let Some(title) = &summary.title {
                println!("title: {title}");
            }
            println!("{}", summary.preview);
        }

        Command::Convert { url_id } => {
            let summary = pipeline.convert_url(url_id).await?;
            println!(
                "converted: {} chars of markdown in {} chunks",
                summary.markdown_len, summary.chunk_count
            );
            println!("{}", summary.preview);
        }

        Command::Process { domain_id, limit } => {
            let pending = pipeline
                .storage()
                .list_urls(domain_id, None, limit.unwrap_or(1000) as u64)
                .await?;
            if pending.is_empty() {
                return Err(eyre!("no URLs for domain {domain_id}; run crawl first"));
            }

            let bar = spinner("processing urls");
            let url_ids: Vec<UrlId> = pending.iter().map(|u| u.id).collect();
            let outcomes = pipeline.process(url_ids, limit).await?;
            bar.finish_and_clear();

            let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
            info!(
                total = outcomes.len(),
                failed,
                "batch processing finished"
            );
            for outcome in &outcomes {
                match &outcome.error {
                    None => println!("ok    {}  {}", outcome.status, outcome.url),
                    Some(error) => println!("fail  {}  {}  {error}", outcome.status, outcome.url),
                }
            }
            println!("{} processed, {} failed", outcomes.len(), failed);
        }

        Command::Status { domain_id } => {
            let report = pipeline.pipeline_status(domain_id).await?;
            for (status, count) in &report.counts {
                println!("{status:>18}  {count}");
            }
            if !report.recent_failures.is_empty() {
                println!("\nrecent failures:");
                for failure in &report.recent_failures {
                    println!(
                        "  {}  {}  {}",
                        failure.status,
                        failure.url,
                        failure.error_message.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Command::Retry { domain_id } => {
            let reset = pipeline.retry_failed(domain_id).await?;
            println!("reset {reset} failed urls to discovered");
        }

        Command::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn run_config(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = init_config()?;
            println!("wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config()?;
            println!("# {}", config_file_path()?.display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_message(message);
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    bar
}
