// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Three subcommands, one per tool:
// - crawl:  read `rank,host` seed lines on stdin, crawl each, print timings
// - replay: read crawl output on stdin, replay it against a trace server
// - serve:  run the trace server
//
// Flags map onto the config structs in config.rs.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::time::Duration;

use crate::config::{
    CrawlConfig, ReplayConfig, ServeConfig, DEFAULT_CRAWL_WORKERS, DEFAULT_MAX_LENGTH,
    DEFAULT_REPLAY_WORKERS, DEFAULT_SERVE_PORT, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
use crate::crawl::ReportFormat;

#[derive(Parser, Debug)]
#[command(
    name = "pagecrawl",
    version,
    about = "Crawl pages and their assets, time them, and replay the timings",
    long_about = "pagecrawl fetches each seed page plus every image, script, stylesheet and \
                  embed it pulls in, printing size and timing per resource. The output can be \
                  replayed against `pagecrawl serve` to reproduce the page load."
)]
pub struct Cli {
    /// Log filter, e.g. `debug` or `pagecrawl=trace` (defaults to RUST_LOG, then info)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl every `rank,host-or-url` line read from stdin
    ///
    /// Example: echo "1,example.com" | pagecrawl crawl
    Crawl(CrawlArgs),

    /// Replay crawl output from stdin against a trace server
    ///
    /// Example: pagecrawl crawl < top.csv | pagecrawl replay 10.0.0.13:8000
    Replay(ReplayArgs),

    /// Run the trace server
    ///
    /// Example: pagecrawl serve 8000
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Number of concurrent fetch workers
    #[arg(long, default_value_t = DEFAULT_CRAWL_WORKERS)]
    pub workers: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// User-Agent header sent with every request
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Print one JSON object per line instead of CSV
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Trace server address as host:port
    pub server: String,

    /// Number of concurrent replay workers
    #[arg(long, default_value_t = DEFAULT_REPLAY_WORKERS)]
    pub workers: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Route requests through a proxy, e.g. socks5://127.0.0.1:9050
    #[arg(long)]
    pub proxy: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_SERVE_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Largest body a single request may ask for, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
    pub max_length: usize,
}

impl From<CrawlArgs> for CrawlConfig {
    fn from(args: CrawlArgs) -> Self {
        Self {
            workers: args.workers,
            timeout: Duration::from_secs(args.timeout),
            user_agent: args.user_agent,
            format: if args.json {
                ReportFormat::Json
            } else {
                ReportFormat::Csv
            },
        }
    }
}

impl From<ReplayArgs> for ReplayConfig {
    fn from(args: ReplayArgs) -> Self {
        Self {
            workers: args.workers,
            timeout: Duration::from_secs(args.timeout),
            proxy: args.proxy,
            ..ReplayConfig::new(args.server)
        }
    }
}

impl From<ServeArgs> for ServeConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_length: args.max_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_crawl_defaults() {
        let cli = Cli::parse_from(["pagecrawl", "crawl"]);
        let Commands::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        let config = CrawlConfig::from(args);
        assert_eq!(config.workers, DEFAULT_CRAWL_WORKERS);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.format, ReportFormat::Csv);
    }

    #[test]
    fn test_replay_flags() {
        let cli = Cli::parse_from([
            "pagecrawl",
            "--log-level",
            "debug",
            "replay",
            "10.0.0.13:9090",
            "--workers",
            "3",
            "--proxy",
            "socks5://127.0.0.1:9050",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Commands::Replay(args) = cli.command else {
            panic!("expected replay");
        };
        let config = ReplayConfig::from(args);
        assert_eq!(config.server, "10.0.0.13:9090");
        assert_eq!(config.workers, 3);
        assert_eq!(config.proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
    }

    #[test]
    fn test_serve_port_is_positional() {
        let cli = Cli::parse_from(["pagecrawl", "serve", "9090"]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(ServeConfig::from(args).port, 9090);
    }
}
