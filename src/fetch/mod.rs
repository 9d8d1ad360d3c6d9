// src/fetch/mod.rs
// =============================================================================
// This module turns a URL into bytes and bytes into more URLs.
//
// Submodules:
// - http: one timed GET per URL, behind the `Fetcher` trait
// - html: pulls img/script/link/embed `src` URLs out of a page
// =============================================================================

mod html;
mod http;

pub use html::extract;
pub use http::{FetchError, Fetched, Fetcher, HttpFetcher};
