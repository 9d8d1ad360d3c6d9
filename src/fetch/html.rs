// src/fetch/html.rs
// =============================================================================
// This module pulls sub-resource URLs out of an HTML page.
//
// A page drags in its assets through the `src` attribute of a handful of
// tags: <img>, <script>, <link> and <embed>. We walk those elements in
// document order, resolve each `src` against the page URL, and hand the
// absolute URLs back to the caller.
//
// We use the `scraper` crate, which sits on html5ever:
// - html5ever recovers from broken markup instead of failing, so a damaged
//   document still yields every link it can find
// - the recoveries it made are kept on the document as parse errors, and we
//   pass them back to the caller next to the links
// - `select()` is a lazy iterator over matching elements in document order,
//   so extraction is a filter/map over that sequence
//
// Bytes that are not valid UTF-8 are dropped before parsing; one bad byte
// in a page should not cost us the rest of its links.
// =============================================================================

use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

// Elements whose `src` attribute names an asset the page loads
const ASSET_SELECTOR: &str = "img[src], script[src], link[src], embed[src]";

/// What a single pass over a page produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Absolute asset URLs, in the order they appear in the document
    pub urls: Vec<String>,
    /// Markup problems the parser recovered from, plus `src` values we could
    /// not resolve
    pub parse_errors: Vec<String>,
}

// Extracts asset URLs from an HTML body
//
// Parameters:
//   base_url: the URL the page was served from (for relative links)
//   body: the raw response bytes
//
// Returns: an Extraction; never fails, at worst the list is partial
//
// Example:
//   base_url = "http://a.com/x/"
//   body     = "<img src='y.png'>"
//   result   = ["http://a.com/x/y.png"]
pub fn extract(base_url: &Url, body: &[u8]) -> Extraction {
    let text = decode_lossy(body);
    let document = Html::parse_document(&text);

    let mut parse_errors: Vec<String> = document
        .errors
        .iter()
        .map(|error| error.to_string())
        .collect();

    let urls = asset_sources(&document)
        .filter_map(|src| match base_url.join(src) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                parse_errors.push(format!("unresolvable src {src:?}: {e}"));
                None
            }
        })
        .collect();

    Extraction { urls, parse_errors }
}

// Lazily yields the raw `src` value of every asset tag, in document order.
// html5ever keeps the first of duplicated attributes, so `attr("src")` is the
// first `src` the tag carried.
fn asset_sources(document: &Html) -> impl Iterator<Item = &str> + '_ {
    document
        .select(asset_selector())
        .filter_map(|element| element.value().attr("src"))
}

fn asset_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    // The selector is a constant, so a parse failure is a programmer error
    SELECTOR.get_or_init(|| Selector::parse(ASSET_SELECTOR).expect("asset selector is valid CSS"))
}

// Keeps every valid UTF-8 run and drops the bytes in between
fn decode_lossy(body: &[u8]) -> String {
    body.utf8_chunks().map(|chunk| chunk.valid()).collect()
}
