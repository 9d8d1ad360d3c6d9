// src/server/error.rs
// Rejections are sent back as JSON: {"error": ..., "status": ...}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum TraceServerError {
    #[error("invalid {name} header: {value:?}")]
    BadHeader { name: &'static str, value: String },

    #[error("invalid length query {0:?}, expected <header_len>&<body_len>")]
    BadQuery(String),

    #[error("no X-Length header and no length query")]
    MissingLength,

    #[error("requested {requested} bytes, limit is {max}")]
    TooLarge { requested: usize, max: usize },

    #[error("reading request body failed: {0}")]
    Body(String),
}

impl IntoResponse for TraceServerError {
    fn into_response(self) -> Response {
        let status = match self {
            TraceServerError::Body(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        warn!("rejecting request: {self}");

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
