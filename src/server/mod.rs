// src/server/mod.rs
// =============================================================================
// The trace server: an HTTP endpoint that answers with exactly as many bytes,
// exactly as late, as the client asks for.
//
// GET, header form (what `pagecrawl replay` sends):
//   X-Length: bytes of random body to return
//   X-Time:   seconds to wait after the headers before sending the body
//
// GET, query form (UCB trace replays):
//   GET /anything?<header_len>&<body_len>
//   returns header_len + body_len random bytes right away
//
// POST: the request body is read to the end and dropped; empty 200 back.
//
// Anything malformed gets a 400 with a JSON error body.
// =============================================================================

mod error;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, request::Parts, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::{stream, StreamExt};
use rand::RngCore;
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::ServeConfig;
use error::TraceServerError;

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_length: usize,
}

pub fn router(max_length: usize) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(Limits { max_length })
}

// Binds and serves until Ctrl-C
pub async fn serve(config: &ServeConfig) -> Result<()> {
    let listener = TcpListener::bind((config.host, config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    info!("serving at {}", listener.local_addr()?);

    axum::serve(listener, router(config.max_length))
        .with_graceful_shutdown(async {
            // If the signal handler cannot be installed, serve until killed
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!("interrupted, shutting down");
        })
        .await
        .context("trace server failed")
}

async fn dispatch(State(limits): State<Limits>, request: Request) -> Result<Response, TraceServerError> {
    let (parts, body) = request.into_parts();
    debug!(method = %parts.method, uri = %parts.uri, headers = ?parts.headers, "request");

    match parts.method {
        Method::GET => send_bytes(&parts, limits).await,
        Method::POST => drain(body).await,
        _ => Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()),
    }
}

async fn send_bytes(parts: &Parts, limits: Limits) -> Result<Response, TraceServerError> {
    let (length, delay) = match header_value::<usize>(&parts.headers, "x-length")? {
        Some(length) => {
            let seconds = header_value::<f64>(&parts.headers, "x-time")?.unwrap_or(0.0);
            let delay = Duration::try_from_secs_f64(seconds).map_err(|_| TraceServerError::BadHeader {
                name: "X-Time",
                value: seconds.to_string(),
            })?;
            (length, delay)
        }
        None => (query_length(parts.uri.query())?, Duration::ZERO),
    };

    if length > limits.max_length {
        return Err(TraceServerError::TooLarge {
            requested: length,
            max: limits.max_length,
        });
    }

    info!(length, "sleeping for {:.2}s", delay.as_secs_f64());
    let payload = random_bytes(length);

    // Headers go out now; the body follows once the delay has passed
    let body = stream::once(async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(payload)
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/html".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

async fn drain(body: Body) -> Result<Response, TraceServerError> {
    let mut chunks = body.into_data_stream();
    let mut count = 0usize;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| TraceServerError::Body(e.to_string()))?;
        count += chunk.len();
        debug!("read {count} bytes");
    }
    info!(bytes = count, "drained request body");

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/html")]).into_response())
}

// Parses a numeric header; absent is fine, unparseable is a 400
fn header_value<T: FromStr>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, TraceServerError> {
    let Some(raw) = headers.get(name) else {
        return Ok(None);
    };
    let bad = || TraceServerError::BadHeader {
        name,
        value: String::from_utf8_lossy(raw.as_bytes()).into_owned(),
    };
    let text = raw.to_str().map_err(|_| bad())?;
    text.trim().parse().map(Some).map_err(|_| bad())
}

// "<header_len>&<body_len>" -> header_len + body_len
fn query_length(query: Option<&str>) -> Result<usize, TraceServerError> {
    let query = query.ok_or(TraceServerError::MissingLength)?;
    let bad = || TraceServerError::BadQuery(query.to_string());

    let (head, body) = query.split_once('&').ok_or_else(bad)?;
    let head: usize = head.parse().map_err(|_| bad())?;
    let body: usize = body.parse().map_err(|_| bad())?;
    head.checked_add(body).ok_or_else(bad)
}

fn random_bytes(length: usize) -> Bytes {
    let mut buf = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut buf);
    Bytes::from(buf)
}

// Starts a server on an ephemeral local port for the duration of a test
#[cfg(test)]
pub(crate) async fn spawn_test_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(crate::config::DEFAULT_MAX_LENGTH))
            .await
            .unwrap();
    });
    addr
}
