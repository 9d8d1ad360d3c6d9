// src/main.rs
// =============================================================================
// This is the entry point of the pagecrawl CLI.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (stderr)
// 3. Dispatch to the subcommand handler
// 4. Exit with 0 on success, 2 if the tool could not start or its input broke
//
// Individual fetch failures never reach this level; they are logged by the
// workers and the run carries on.
// =============================================================================

mod cli;
mod config;
mod crawl;
mod fetch;
mod replay;
mod server;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

use cli::{Cli, Commands};
use config::{CrawlConfig, ReplayConfig, ServeConfig};
use crawl::{ReportSink, StdoutSink, WorkerPool};
use fetch::HttpFetcher;
use replay::ReplayClient;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            2
        }
    };

    // Exits without waiting on any worker still parked on the runtime
    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    telemetry::init(cli.log_level.as_deref());

    match cli.command {
        Commands::Crawl(args) => handle_crawl(args.into()).await,
        Commands::Replay(args) => handle_replay(args.into()).await,
        Commands::Serve(args) => handle_serve(args.into()).await,
    }
}

// Crawls every seed line on stdin with one shared worker pool
async fn handle_crawl(config: CrawlConfig) -> Result<i32> {
    info!(workers = config.workers, timeout = ?config.timeout, "starting crawl");

    let fetcher = HttpFetcher::new(&config.user_agent, config.timeout)
        .context("building HTTP client")?;
    let sink: Arc<dyn ReportSink> = Arc::new(StdoutSink::new(config.format));
    let pool = WorkerPool::start(config.workers, Arc::new(fetcher), sink.clone());

    let input = BufReader::new(tokio::io::stdin());
    let rounds = crawl::run(input, &pool, sink.as_ref()).await?;

    info!(rounds, "all seeds crawled");
    pool.shutdown().await;
    Ok(0)
}

async fn handle_replay(config: ReplayConfig) -> Result<i32> {
    info!(server = %config.server, workers = config.workers, "starting replay");

    let client = ReplayClient::new(&config)?;
    let input = BufReader::new(tokio::io::stdin());
    let pages = replay::run(input, &client).await?;

    info!(pages, "all pages replayed");
    Ok(0)
}

async fn handle_serve(config: ServeConfig) -> Result<i32> {
    server::serve(&config).await?;
    Ok(0)
}
