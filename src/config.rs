// src/config.rs
// =============================================================================
// Settings for each subcommand, with the defaults the tools ship with.
//
// cli.rs parses flags; this file owns what they mean. Each subcommand gets
// a plain struct the rest of the code takes by reference, so tests can
// build one without going through clap.
// =============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use url::Url;

use crate::crawl::ReportFormat;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; U; Linux i686) Gecko/20071127 Firefox/2.0.0.11";
pub const DEFAULT_CRAWL_WORKERS: usize = 5;
pub const DEFAULT_REPLAY_WORKERS: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SERVE_PORT: u16 = 8000;
// Largest body the trace server will generate for one request
pub const DEFAULT_MAX_LENGTH: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub workers: usize,
    /// Upper bound on one fetch, connect through the last body byte
    pub timeout: Duration,
    pub user_agent: String,
    pub format: ReportFormat,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_CRAWL_WORKERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            format: ReportFormat::Csv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// `host:port` of the trace server
    pub server: String,
    pub workers: usize,
    pub timeout: Duration,
    pub user_agent: String,
    /// e.g. `socks5://127.0.0.1:9050`
    pub proxy: Option<String>,
}

impl ReplayConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            workers: DEFAULT_REPLAY_WORKERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }

    // Every replayed request goes to the same path; the headers carry the
    // per-asset details
    pub fn endpoint(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}/index", self.server))
    }
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_length: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_SERVE_PORT,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}
