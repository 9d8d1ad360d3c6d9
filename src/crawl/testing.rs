// src/crawl/testing.rs
// Canned pages for exercising the pool and driver without a network.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::fetch::{FetchError, Fetched, Fetcher};

#[derive(Debug, Clone)]
pub(crate) enum Stub {
    Page { content_type: String, body: Bytes },
    Fail,
    Panic,
}

impl Stub {
    pub(crate) fn html(body: &str) -> Self {
        Stub::Page {
            content_type: "text/html".into(),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    pub(crate) fn asset(content_type: &str, len: usize) -> Self {
        Stub::Page {
            content_type: content_type.into(),
            body: Bytes::from(vec![b'x'; len]),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StubFetcher {
    pages: HashMap<String, Stub>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(mut self, url: &str, stub: Stub) -> Self {
        self.pages.insert(url.to_string(), stub);
        self
    }

    /// Every URL fetched so far, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        // Yield so sibling tasks genuinely overlap
        tokio::time::sleep(Duration::from_millis(2)).await;

        match self.pages.get(url) {
            Some(Stub::Page { content_type, body }) => Ok(Fetched {
                url: Url::parse(url).unwrap(),
                content_type: content_type.clone(),
                body: body.clone(),
                elapsed: Duration::from_millis(2),
            }),
            Some(Stub::Panic) => panic!("stub asked to panic on {url}"),
            Some(Stub::Fail) | None => Err(FetchError::Status {
                url: url.to_string(),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            }),
        }
    }
}
