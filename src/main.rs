//! kb-harvest main entry point
//!
//! This is the command-line interface for the kb-harvest crawl engine.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use kb_harvest::config::{load_config_with_hash, Config, SiteEntry};
use kb_harvest::crawler::Harvester;
use kb_harvest::output::{write_markdown_summary, RunSummary};
use kb_harvest::server::{self, AppState};
use kb_harvest::storage::{RunStatus, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// kb-harvest: crawl sites into a knowledge base
///
/// Discovers, fetches and stores a bounded set of pages per site, streaming
/// progress as it goes.
#[derive(Parser, Debug)]
#[command(name = "kb-harvest")]
#[command(version)]
#[command(about = "Crawl orchestration for knowledge-base sites", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a configured site, printing progress events as JSON lines
    Crawl {
        /// Site id from the configuration
        #[arg(long)]
        site: i64,

        /// Crawl on behalf of this owner (defaults to the site's owner)
        #[arg(long)]
        owner: Option<i64>,

        /// Write a markdown run report here when the crawl ends
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
    },

    /// Fetch and store a single URL of a configured site
    Refresh {
        #[arg(long)]
        site: i64,

        #[arg(long)]
        owner: Option<i64>,

        url: String,
    },

    /// Serve the streaming HTTP endpoints
    Serve,

    /// Validate the configuration and show what would be crawled
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Crawl {
            site,
            owner,
            summary,
        } => handle_crawl(&config, &config_hash, site, owner, summary).await,
        Command::Refresh { site, owner, url } => {
            handle_refresh(&config, &config_hash, site, owner, &url).await
        }
        Command::Serve => handle_serve(&config, &config_hash).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kb_harvest=info,warn"),
            1 => EnvFilter::new("kb_harvest=debug,info"),
            2 => EnvFilter::new("kb_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Events go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn find_site(config: &Config, site_id: i64) -> anyhow::Result<&SiteEntry> {
    config
        .sites
        .iter()
        .find(|s| s.id == site_id)
        .ok_or_else(|| anyhow!("Site {} is not declared in the configuration", site_id))
}

/// Cancels `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight fetches");
            token.cancel();
        }
    });
}

/// Handles `check`: the configuration was already validated on load
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== kb-harvest configuration ===\n");

    println!("Storage:");
    println!("  Root: {}", config.storage.root);
    println!("  Database: {}", config.storage.database_path);
    println!();

    println!("Crawl defaults:");
    println!("  Max connections: {}", config.crawl.max_connections);
    println!("  Concurrency: {}", config.crawl.concurrency);
    println!("  Link selector: {}", config.crawl.link_selector);
    println!("  Type: {}", config.crawl.crawl_type);
    println!("  Max retries: {}", config.crawl.max_retries);
    println!();

    println!("Sites ({}):", config.sites.len());
    for site in &config.sites {
        println!(
            "  [{}] {} (kb {}, owner {}, engine {})",
            site.id, site.name, site.knowledge_base_id, site.owner_id, site.engine_type
        );
        for url in &site.start_urls {
            println!("      start: {}", url);
        }
        for pattern in &site.match_patterns {
            println!("      match: {}", pattern);
        }
        for pattern in &site.ignore_patterns {
            println!("      ignore: {}", pattern);
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    site_id: i64,
    owner: Option<i64>,
    summary_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let site = find_site(config, site_id)?;
    let owner_id = owner.unwrap_or(site.owner_id);
    let harvester = Harvester::from_config(config, config_hash)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut handle = harvester
        .start_crawl(
            owner_id,
            site.knowledge_base_id,
            site.id,
            &config.crawl,
            cancel,
        )
        .await?;

    while let Some(event) = handle.events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    let terminal = match handle.task.await {
        Ok(terminal) => terminal,
        Err(e) => {
            harvester
                .storage()
                .finish_run(handle.run_id, RunStatus::Failed, 0, 0)?;
            return Err(anyhow!("crawl task failed: {}", e));
        }
    };

    if let Some(path) = summary_path {
        let run = harvester.storage().get_run(handle.run_id)?;
        let site_record = harvester
            .storage()
            .get_site(site.id)?
            .ok_or_else(|| anyhow!("Site {} vanished from storage", site.id))?;
        let summary = RunSummary::from_run(&run, &site_record, &terminal);
        write_markdown_summary(&summary, &path)
            .with_context(|| format!("writing summary to {}", path.display()))?;
        tracing::info!("Run summary written to {}", path.display());
    }

    Ok(())
}

async fn handle_refresh(
    config: &Config,
    config_hash: &str,
    site_id: i64,
    owner: Option<i64>,
    url: &str,
) -> anyhow::Result<()> {
    let site = find_site(config, site_id)?;
    let harvester = Harvester::from_config(config, config_hash)?;

    let event = harvester
        .refresh(
            owner.unwrap_or(site.owner_id),
            site.knowledge_base_id,
            site.id,
            url,
            &config.crawl.link_selector,
        )
        .await?;

    println!("{}", serde_json::to_string(&event)?);
    Ok(())
}

async fn handle_serve(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let harvester = Harvester::from_config(config, config_hash)?;

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let state = AppState::new(Arc::new(harvester), config.crawl.clone(), shutdown);
    server::serve(&config.server.bind, state).await?;
    Ok(())
}
