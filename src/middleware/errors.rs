//! Terminal error stage, 404 fallback and panic capture.
//!
//! # Architecture
//!
//! ```text
//! handle_errors ─► CatchPanic ─► body parsing ─► rate limiter ─► router
//!      ▲                │                                          │
//!      │         panic → Failure                          Failure / AppError
//!      └──────────── response extensions ◄───────────────────────────┘
//! ```
//!
//! Inner stages only tag their response with a [`Failure`]. [`handle_errors`]
//! is the single place where that failure is normalized, logged and rendered
//! as the JSON error body. Headers set by inner stages (rate limit headers,
//! for instance) survive the rewrite.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::panic::PanicHookInfo;

use axum::Json;
use axum::extract::{OriginalUri, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::config::Environment;
use crate::error::{AppError, Failure, format_error, normalize};

thread_local! {
    // Written by the panic hook, read back by `failure_from_panic` on the
    // same thread once the unwind is caught.
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Router fallback for unmatched paths and unmatched methods.
pub async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    AppError::not_found(format!("Cannot find {method} {uri}"))
}

/// Terminal stage: turns a tagged [`Failure`] into the uniform error body.
///
/// Responses without a failure pass through untouched. This stage cannot
/// fail.
pub async fn handle_errors(
    State(environment): State<Environment>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let mut response = next.run(req).await;
    let Some(failure) = response.extensions_mut().remove::<Failure>() else {
        return response;
    };

    let original = failure.to_string();
    let app_error = normalize(failure, environment);

    if app_error.is_operational() {
        warn!(
            status_code = app_error.status().as_u16(),
            path = %path,
            method = %method,
            "{}",
            app_error.message()
        );
    } else {
        error!(
            status_code = app_error.status().as_u16(),
            path = %path,
            method = %method,
            stack = %app_error.stack(),
            "Unhandled error: {original}"
        );
    }

    render(response, &app_error, environment)
}

/// Replace status and body, keep every other header.
fn render(response: Response, app_error: &AppError, environment: Environment) -> Response {
    let (mut parts, _) = response.into_parts();
    parts.status = app_error.status();
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let body = Json(format_error(app_error, environment))
        .into_response()
        .into_body();

    Response::from_parts(parts, body)
}

/// Panic hook companion: remember where the current thread panicked.
pub fn record_panic(info: &PanicHookInfo<'_>) {
    let message = panic_message(info.payload());
    let location = info
        .location()
        .map_or_else(|| "<unknown>".to_string(), ToString::to_string);

    let mut stack = format!("Panic: {message}\n    at {location}");
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        stack.push('\n');
        stack.push_str(&backtrace.to_string());
    }

    LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(stack));
}

/// `CatchPanicLayer` response factory: the panic becomes an unexpected failure.
pub fn failure_from_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    let stack = LAST_PANIC
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| format!("Panic: {message}"));

    Failure::Unexpected { message, stack }.into_response()
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
