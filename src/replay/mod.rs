// src/replay/mod.rs
// =============================================================================
// Replays recorded crawls against a trace server to time page loads.
//
// Submodules:
// - trace:  crawl output -> page traces (asset tree per page)
// - client: a worker pool that walks one page's tree over HTTP
// =============================================================================

mod client;
mod trace;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tracing::info;

pub use client::ReplayClient;
pub use trace::TraceReader;

// Replays every page found in `input`, printing one timing line per page
//
// Returns: how many pages were replayed
pub async fn run<R>(input: R, client: &ReplayClient) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = TraceReader::new(input);
    let mut pages = 0;

    println!("time,total_bytes");
    while let Some(page) = reader.next_page().await.context("reading crawl trace")? {
        let outcome = client.replay(Arc::new(page)).await;
        info!(
            requests = outcome.requests,
            failures = outcome.failures,
            "page replayed"
        );
        println!("{outcome}");
        pages += 1;
    }

    Ok(pages)
}
