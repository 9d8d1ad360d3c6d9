// src/fetch/http.rs
// =============================================================================
// This module fetches a single URL and times it.
//
// Key functionality:
// - One GET per URL with a fixed User-Agent, no retries
// - Wall-clock time from sending the request until the body is in memory
// - Non-2xx answers and network failures both come back as a FetchError;
//   the caller drops the task and moves on
//
// The crawl workers only see the `Fetcher` trait, so tests can hand them a
// canned set of pages instead of a network.
// =============================================================================

use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

// What the server sends back when it does not say what it sent
const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// A successfully fetched resource.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Where the body finally came from, after redirects
    pub url: Url,
    /// MIME essence of the Content-Type header, e.g. `text/html`
    pub content_type: String,
    pub body: Bytes,
    pub elapsed: Duration,
}

impl Fetched {
    pub fn is_html(&self) -> bool {
        self.content_type == "text/html"
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("reading body of {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// A short label for the failure, used as a log field.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Status { status, .. } if status.is_client_error() => "client_error",
            FetchError::Status { .. } => "server_error",
            FetchError::Transport { source, .. } | FetchError::Body { source, .. } => {
                categorize(source)
            }
        }
    }
}

// Sorts reqwest failures into a few buckets
//
// reqwest errors can happen for many reasons:
// - Network timeout
// - DNS resolution failure
// - Connection refused / reset
// - Too many redirects
fn categorize(error: &reqwest::Error) -> &'static str {
    let text = error.to_string();
    if error.is_timeout() {
        "timeout"
    } else if error.is_redirect() {
        "too_many_redirects"
    } else if error.is_connect() {
        if text.contains("dns") {
            "dns"
        } else {
            "connect"
        }
    } else if error.is_builder() {
        "bad_url"
    } else {
        "other"
    }
}

/// Anything that can turn a URL into a `Fetched` resource.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Fetched, FetchError>> + Send;
}

/// The real fetcher, backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    // Builds the client once; it pools connections across every worker
    //
    // Parameters:
    //   user_agent: sent with every request
    //   timeout: upper bound on one request, connect through last body byte
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let final_url = response.url().clone();
        let content_type = content_type_of(&response);

        let body = response.bytes().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;
        let elapsed = start.elapsed();

        debug!(%url, bytes = body.len(), ?elapsed, "fetched");

        Ok(Fetched {
            url: final_url,
            content_type,
            body,
            elapsed,
        })
    }
}

// "text/HTML; charset=utf-8" -> "text/html"
fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(mime_essence)
        .filter(|essence| !essence.is_empty())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

// Stops at the first `;` or `,` so a listed or parameterised header can
// never put a comma into a progress line
fn mime_essence(header: &str) -> String {
    header
        .split([';', ','])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
