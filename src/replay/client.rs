// src/replay/client.rs
// =============================================================================
// Replays a page trace against a trace server.
//
// The page is loaded the way a browser would have loaded it: the root asset
// first, and each asset's children only once that asset has arrived. Every
// request goes to the same endpoint and tells the server, through headers,
// how long to stall and how many bytes to send:
//
//   X-URL:    the original asset URL (informational)
//   X-Time:   seconds to wait, two decimals
//   X-Length: bytes to return
//
// A request that fails is logged and its subtree is skipped.
// =============================================================================

use anyhow::{Context, Result};
use reqwest::{Client, Proxy};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use super::trace::{Asset, PageTrace};
use crate::config::ReplayConfig;
use crate::crawl::WorkQueue;

/// How one page replay went.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayOutcome {
    pub elapsed: Duration,
    pub total_bytes: u64,
    pub requests: usize,
    pub failures: usize,
}

// The line printed per page: "<seconds>,<total_bytes>"
impl fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2},{}", self.elapsed.as_secs_f64(), self.total_bytes)
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicUsize,
    failures: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct ReplayClient {
    client: Client,
    endpoint: Url,
    workers: usize,
}

impl ReplayClient {
    pub fn new(config: &ReplayConfig) -> Result<Self> {
        let endpoint = config
            .endpoint()
            .with_context(|| format!("invalid trace server address {:?}", config.server))?;

        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .with_context(|| format!("invalid proxy address {proxy:?}"))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().context("building replay HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            workers: config.workers.max(1),
        })
    }

    pub async fn replay(&self, page: Arc<PageTrace>) -> ReplayOutcome {
        let Some(root) = page.root() else {
            warn!(assets = page.len(), "page has no root asset, nothing to replay");
            return ReplayOutcome {
                total_bytes: page.total_bytes(),
                ..ReplayOutcome::default()
            };
        };

        let queue = Arc::new(WorkQueue::new());
        let counters = Arc::new(Counters::default());

        let start = Instant::now();
        queue.push(root.id.clone());

        let mut workers = JoinSet::new();
        for _ in 0..self.workers {
            let this = self.clone();
            let queue = queue.clone();
            let page = page.clone();
            let counters = counters.clone();
            workers.spawn(async move { this.work(&queue, &page, &counters).await });
        }

        queue.join().await;
        let elapsed = start.elapsed();

        queue.close();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("replay worker ended abnormally: {e}");
            }
        }

        ReplayOutcome {
            elapsed,
            total_bytes: page.total_bytes(),
            requests: counters.requests.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }

    async fn work(&self, queue: &WorkQueue<String>, page: &PageTrace, counters: &Counters) {
        while let Some(id) = queue.pop().await {
            let _done = queue.done_guard();
            let Some(asset) = page.asset(&id) else {
                continue;
            };

            counters.requests.fetch_add(1, Ordering::Relaxed);
            match self.request(asset).await {
                Ok(()) => {
                    for child in page.children(&id) {
                        queue.push(child.clone());
                    }
                }
                Err(e) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(asset = %id, url = %asset.url, "replay request failed, skipping its children: {e}");
                }
            }
        }
    }

    async fn request(&self, asset: &Asset) -> Result<(), reqwest::Error> {
        let start = Instant::now();

        let response = self
            .client
            .get(self.endpoint.clone())
            .header("X-URL", asset.url.as_str())
            .header("X-Time", format!("{:.2}", asset.delay))
            .header("X-Length", asset.length.to_string())
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        debug!(
            asset = %asset.id,
            "got {} bytes in {:.2}s",
            body.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::trace::parse_record;
    use crate::server::spawn_test_server;

    fn page(lines: &[&str]) -> Arc<PageTrace> {
        Arc::new(PageTrace::from_assets(lines.iter().map(|l| parse_record(l).unwrap())))
    }

    fn client(server: &str, workers: usize) -> ReplayClient {
        let config = ReplayConfig {
            workers,
            ..ReplayConfig::new(server)
        };
        ReplayClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_replays_whole_tree() {
        let addr = spawn_test_server().await;
        let page = page(&[
            "0,0,0,text/html,1000,0.05,http://a/",
            "0.0,0,1,image/png,200,0.00,http://a/x.png",
            "0.1,0,1,text/html,300,0.02,http://a/f.html",
            "0.1.0,0.1,2,image/gif,40,0.00,http://a/y.gif",
        ]);

        let outcome = client(&addr.to_string(), 3).replay(page).await;

        assert_eq!(outcome.requests, 4);
        assert_eq!(outcome.failures, 0);
        assert_eq!(outcome.total_bytes, 1540);
        // Root and the 0.1 chain stall in sequence
        assert!(outcome.elapsed >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn test_failed_request_skips_subtree() {
        // Nothing is listening on this port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let page = page(&[
            "0,0,0,text/html,10,0.00,http://a/",
            "0.0,0,1,image/png,20,0.00,http://a/x.png",
        ]);

        let outcome = client(&addr.to_string(), 2).replay(page).await;
        assert_eq!(outcome.requests, 1);
        assert_eq!(outcome.failures, 1);
    }

    #[tokio::test]
    async fn test_page_without_root() {
        let page = page(&["0.4,0.1,2,image/png,20,0.00,http://a/x.png"]);
        let outcome = client("127.0.0.1:9", 1).replay(page).await;
        assert_eq!(outcome.requests, 0);
        assert_eq!(outcome.total_bytes, 20);
    }

    #[test]
    fn test_outcome_line() {
        let outcome = ReplayOutcome {
            elapsed: Duration::from_millis(1234),
            total_bytes: 5000,
            ..ReplayOutcome::default()
        };
        assert_eq!(outcome.to_string(), "1.23,5000");
    }
}
