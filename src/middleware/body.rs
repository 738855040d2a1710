//! JSON body pre-parsing.
//!
//! Requests declaring a JSON content type (`application/json` or any
//! `+json` suffix) are buffered up to the configured limit and checked for
//! syntactic validity before routing:
//!
//! - declared or actual size over the limit → 413 `Request entity too large`
//! - not valid JSON → malformed-body failure (400 `Invalid JSON`)
//!
//! The buffered bytes are handed on unchanged, so extractors downstream
//! never see a half-read body. Other content types are not touched.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::de::IgnoredAny;

use crate::error::{AppError, Failure};

/// Message for bodies over the configured limit.
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "Request entity too large";

/// Middleware body; state is the maximum body size in bytes.
pub async fn parse_json_body(
    State(limit): State<usize>,
    req: Request,
    next: Next,
) -> Result<Response, Failure> {
    if !is_json(req.headers()) {
        return Ok(next.run(req).await);
    }

    if let Some(declared) = content_length(req.headers())
        && declared > limit
    {
        return Err(too_large());
    }

    let (parts, body) = req.into_parts();
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => return Err(too_large()),
        Err(e) => {
            return Err(AppError::new(
                format!("Failed to read request body: {e}"),
                StatusCode::BAD_REQUEST,
            )
            .into());
        }
    };

    if !bytes.is_empty() {
        serde_json::from_slice::<IgnoredAny>(&bytes)?;
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

fn too_large() -> Failure {
    AppError::new(PAYLOAD_TOO_LARGE_MESSAGE, StatusCode::PAYLOAD_TOO_LARGE).into()
}

fn is_json(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
