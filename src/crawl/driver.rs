// src/crawl/driver.rs
// =============================================================================
// Reads seed lines and runs one round per seed.
//
// Input, one seed per line:
//
//   <rank>,<host-or-url>
//
// The rank is passed through untouched. A bare host like `example.com`
// becomes `http://www.example.com/`; anything with a scheme is used as is.
//
// For each seed we print the round marker, hand a fresh Round to the pool,
// wait for it to drain, and print the summary. Lines that do not parse are
// logged and skipped; they never end the run.
// =============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};
use url::Url;

use super::pool::WorkerPool;
use super::report::ReportSink;
use super::round::Round;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("expected `rank,url` but found no comma in {0:?}")]
    MissingComma(String),

    #[error("seed line {0:?} has an empty url")]
    EmptyUrl(String),

    #[error("invalid seed url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub rank: String,
    pub url: Url,
}

pub fn parse_seed_line(line: &str) -> Result<Seed, SeedError> {
    // Split on the first comma only; the URL may contain more
    let (rank, target) = line
        .split_once(',')
        .ok_or_else(|| SeedError::MissingComma(line.to_string()))?;

    // The rank stays exactly as written, the target loses its whitespace
    let target = target.trim();
    if target.is_empty() {
        return Err(SeedError::EmptyUrl(line.to_string()));
    }

    Ok(Seed {
        rank: rank.to_string(),
        url: normalize_seed(target)?,
    })
}

// Turns a host or URL into an absolute URL
//
// Examples:
//   "example.com"            -> "http://www.example.com/"
//   "https://example.com/a"  -> "https://example.com/a"
pub fn normalize_seed(target: &str) -> Result<Url, SeedError> {
    let candidate = if has_scheme(target) {
        target.to_string()
    } else {
        format!("http://www.{target}")
    };

    Url::parse(&candidate).map_err(|source| SeedError::InvalidUrl {
        url: candidate,
        source,
    })
}

// True when `target` opens with `<scheme>://`. A `://` later on, say inside
// a query string, does not count.
fn has_scheme(target: &str) -> bool {
    let Some((scheme, _)) = target.split_once("://") else {
        return false;
    };

    let mut chars = scheme.chars();
    // scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

// Runs every seed read from `input` through `pool`
//
// Returns: how many rounds were run
pub async fn run<R>(input: R, pool: &WorkerPool, sink: &dyn ReportSink) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut rounds = 0;

    while let Some(line) = lines.next_line().await.context("reading seed lines")? {
        // Blank lines are allowed anywhere
        if line.trim().is_empty() {
            continue;
        }

        // A bad line costs us that seed, nothing more
        let seed = match parse_seed_line(&line) {
            Ok(seed) => seed,
            Err(e) => {
                warn!("skipping seed line: {e}");
                continue;
            }
        };

        // Fresh seen-set and queue for every seed
        let round = Arc::new(Round::new(seed.rank, seed.url.as_str()));
        sink.round_started(round.rank(), round.seed_url());

        // Blocks until every task of this round has been reported
        let summary = pool.run_round(round).await;
        info!(
            rank = %summary.rank,
            tasks = summary.tasks,
            bytes = summary.bytes,
            "round finished in {:.2}s",
            summary.elapsed
        );
        sink.round_finished(&summary);
        rounds += 1;
    }

    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::report::{MemorySink, ReportEvent};
    use crate::crawl::testing::{Stub, StubFetcher};
    use crate::fetch::HttpFetcher;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_bare_host() {
        let seed = parse_seed_line("1,google.com\n").unwrap();
        assert_eq!(seed.rank, "1");
        assert_eq!(seed.url.as_str(), "http://www.google.com/");
    }

    #[test]
    fn test_parse_full_url_and_verbatim_rank() {
        let seed = parse_seed_line(" 42 ,  https://example.org/start?x=1  ").unwrap();
        assert_eq!(seed.rank, " 42 ");
        assert_eq!(seed.url.as_str(), "https://example.org/start?x=1");
    }

    #[test]
    fn test_bare_host_with_url_in_query() {
        let url = normalize_seed("example.com/?next=http://b.com/").unwrap();
        assert_eq!(url.host_str(), Some("www.example.com"));
        assert_eq!(url.query(), Some("next=http://b.com/"));

        assert!(has_scheme("https://a.org"));
        assert!(has_scheme("svn+ssh://a.org"));
        assert!(!has_scheme("a.org/x?u=http://b"));
        assert!(!has_scheme("://a.org"));
        assert!(!has_scheme("1http://a.org"));
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(matches!(parse_seed_line("no-comma-here"), Err(SeedError::MissingComma(_))));
        assert!(matches!(parse_seed_line("3,   "), Err(SeedError::EmptyUrl(_))));
        assert!(matches!(parse_seed_line("4,http://"), Err(SeedError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_rounds_are_framed_by_marker_and_summary() {
        let fetcher = StubFetcher::new()
            .page("http://one/", Stub::html(r#"<img src="a.png">"#))
            .page("http://one/a.png", Stub::asset("image/png", 4))
            .page("http://two/", Stub::asset("text/plain", 9));
        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(MemorySink::default());
        let pool = WorkerPool::start(3, fetcher, sink.clone());

        let input: &[u8] = b"1,http://one/\n\ngarbage\n2,http://two/\n";
        let rounds = run(input, &pool, sink.as_ref()).await.unwrap();
        assert_eq!(rounds, 2);

        let events = sink.events();
        assert_eq!(events.len(), 2 + 3 + 2);
        assert_eq!(
            events[0],
            ReportEvent::RoundStarted { rank: "1".into(), url: "http://one/".into() }
        );
        // Round one's two progress lines land before its summary
        assert!(matches!(events[1], ReportEvent::Task(_)));
        assert!(matches!(events[2], ReportEvent::Task(_)));
        assert!(matches!(&events[3], ReportEvent::RoundFinished(s) if s.rank == "1" && s.tasks == 2));
        assert!(matches!(&events[4], ReportEvent::RoundStarted { rank, .. } if rank == "2"));
        assert!(matches!(&events[5], ReportEvent::Task(t) if t.url == "http://two/"));
        assert!(matches!(&events[6], ReportEvent::RoundFinished(s) if s.tasks == 1 && s.bytes == 9));
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/root.html"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    r#"<html><img src="a.png"><script src="/b.js"></script></html>"#,
                    "text/html",
                ),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "image/png"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.js"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Arc::new(HttpFetcher::new("pagecrawl-test", Duration::from_secs(5)).unwrap());
        let sink = Arc::new(MemorySink::default());
        let pool = WorkerPool::start(5, fetcher, sink.clone());

        let input = format!("9,{}/root.html\n", server.uri());
        let rounds = run(input.as_bytes(), &pool, sink.as_ref()).await.unwrap();
        assert_eq!(rounds, 1);

        let mut tasks = sink.tasks();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(tasks.len(), 2);
        assert_eq!((tasks[0].id.as_str(), tasks[0].depth), ("0", 0));
        assert_eq!((tasks[1].id.as_str(), tasks[1].parent_id.as_str(), tasks[1].depth), ("0.0", "0", 1));
        assert_eq!(tasks[1].content_type, "image/png");
        assert_eq!(tasks[1].bytes, 64);

        match sink.events().last() {
            Some(ReportEvent::RoundFinished(summary)) => {
                assert_eq!(summary.rank, "9");
                assert_eq!(summary.tasks, 2);
            }
            other => panic!("expected a summary last, got {other:?}"),
        }
    }
}
