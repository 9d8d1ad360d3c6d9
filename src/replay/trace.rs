// src/replay/trace.rs
// =============================================================================
// Reads crawl output back in as a set of page traces.
//
// The input is exactly what `pagecrawl crawl` prints:
//
//   ==1,http://www.example.com/==            starts a page
//   0,0,0,text/html,5120,0.31,http://...      one asset
//   0.0,0,1,image/png,880,0.05,http://...
//   #1,0.42,2,6000                            summary, ignored here
//
// A page's asset lines may arrive in any order (a child can finish before
// its parent), so the parent -> children map is built only once the whole
// page has been read.
// =============================================================================

use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

const ROOT_ID: &str = "0";

/// One asset as recorded by the crawler.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: String,
    pub parent_id: String,
    /// Bytes the trace server should send back
    pub length: u64,
    /// Seconds the trace server should wait before sending them
    pub delay: f64,
    pub url: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum TraceError {
    #[error("expected 7 comma-separated fields, found {0}")]
    FieldCount(usize),

    #[error("bad {field} value {value:?}")]
    BadNumber { field: &'static str, value: String },
}

// Parses one progress line: id,parent_id,depth,content_type,bytes,secs,url
pub fn parse_record(line: &str) -> Result<Asset, TraceError> {
    let fields: Vec<&str> = line.splitn(7, ',').collect();
    let [id, parent_id, _depth, _content_type, length, delay, url] = fields.as_slice() else {
        return Err(TraceError::FieldCount(fields.len()));
    };

    let length = length.trim().parse().map_err(|_| TraceError::BadNumber {
        field: "length",
        value: length.to_string(),
    })?;
    let delay: f64 = delay.trim().parse().map_err(|_| TraceError::BadNumber {
        field: "elapsed",
        value: delay.to_string(),
    })?;
    if !delay.is_finite() || delay < 0.0 {
        return Err(TraceError::BadNumber {
            field: "elapsed",
            value: delay.to_string(),
        });
    }

    Ok(Asset {
        id: id.trim().to_string(),
        parent_id: parent_id.trim().to_string(),
        length,
        delay,
        url: url.trim().to_string(),
    })
}

/// One crawled page: its assets and who pulled in whom.
#[derive(Debug, Default)]
pub struct PageTrace {
    assets: HashMap<String, Asset>,
    children: HashMap<String, Vec<String>>,
    total_bytes: u64,
}

impl PageTrace {
    pub fn from_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        let mut trace = PageTrace::default();

        for asset in assets {
            trace.total_bytes += asset.length;
            if asset.id != asset.parent_id {
                trace
                    .children
                    .entry(asset.parent_id.clone())
                    .or_default()
                    .push(asset.id.clone());
            }
            trace.assets.insert(asset.id.clone(), asset);
        }

        for (parent, children) in trace.children.iter_mut() {
            children.sort();
            if !trace.assets.contains_key(parent) {
                warn!(parent = %parent, orphans = children.len(), "assets whose parent was never recorded will not be replayed");
            }
        }

        trace
    }

    pub fn root(&self) -> Option<&Asset> {
        self.assets.get(ROOT_ID)
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.get(id)
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Sum of every recorded asset length, reached or not.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }
}

/// Splits a crawl log into pages, one at a time.
pub struct TraceReader<R> {
    lines: Lines<R>,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> TraceReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            finished: false,
        }
    }

    // Returns the next page with at least one asset, or None at end of input
    pub async fn next_page(&mut self) -> std::io::Result<Option<PageTrace>> {
        let mut assets = Vec::new();

        while !self.finished {
            let Some(line) = self.lines.next_line().await? else {
                self.finished = true;
                break;
            };

            if line.starts_with("==") {
                if assets.is_empty() {
                    continue;
                }
                break;
            }
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }

            match parse_record(&line) {
                Ok(asset) => assets.push(asset),
                Err(e) => warn!("skipping trace line {line:?}: {e}"),
            }
        }

        if assets.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PageTrace::from_assets(assets)))
        }
    }
}
