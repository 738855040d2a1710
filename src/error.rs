//! Error taxonomy, normalization and the uniform JSON error body.
//!
//! # Flow
//!
//! ```text
//! handler / middleware ──► Failure ──► (terminal stage) normalize ──► AppError ──► format_error ──► JSON
//! ```
//!
//! Handlers and middleware never write error bodies themselves. They return a
//! [`Failure`] (or an [`AppError`], which converts into one); its
//! `IntoResponse` impl only tags the response. The terminal stage in
//! [`crate::middleware::errors`] normalizes, logs and renders it, so every
//! error on the surface has the same shape.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::Location;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::error::Category;
use thiserror::Error;

use crate::config::Environment;
use crate::models::ErrorBody;
use crate::validation::{Violation, Violations};

/// Client-facing message for unexpected errors in production.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong";

/// Message for request bodies that are not valid JSON.
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON";

/// Category of an [`AppError`], each with a default status and message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Generic,
    NotFound,
    Validation,
    Unauthorized,
    Forbidden,
}

impl ErrorKind {
    pub fn default_status(self) -> StatusCode {
        match self {
            Self::Generic => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::Generic => GENERIC_ERROR_MESSAGE,
            Self::NotFound => "Resource not found",
            Self::Validation => "Validation failed",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Generic => "AppError",
            Self::NotFound => "NotFoundError",
            Self::Validation => "ValidationError",
            Self::Unauthorized => "UnauthorizedError",
            Self::Forbidden => "ForbiddenError",
        }
    }
}

/// A normalized, client-describable error.
///
/// `is_operational` separates anticipated failures (bad input, missing
/// resources) from faults; only the latter have their message replaced in
/// production.
///
/// Constructors are `#[track_caller]`: the stack records where the error was
/// created, followed by a full backtrace when `RUST_BACKTRACE` enables one.
/// The backtrace is only symbolized when [`AppError::stack`] is called.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    status: StatusCode,
    operational: bool,
    stack: Stack,
}

impl AppError {
    /// Operational error with an explicit status.
    #[track_caller]
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        Self::build(ErrorKind::Generic, message.into(), status, true)
    }

    /// Operational 500.
    #[track_caller]
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Non-operational 500: a fault the client cannot act on.
    #[track_caller]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Generic,
            message.into(),
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
        )
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::NotFound, message.into())
    }

    #[track_caller]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Validation, message.into())
    }

    #[track_caller]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Unauthorized, message.into())
    }

    #[track_caller]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Forbidden, message.into())
    }

    /// Error of `kind` with its default message.
    #[track_caller]
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::of_kind(kind, kind.default_message().to_string())
    }

    /// Replace the recorded stack (e.g. with one captured at a panic site).
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        if !stack.is_empty() {
            self.stack = Stack {
                origin: stack,
                backtrace: None,
            };
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    pub fn stack(&self) -> String {
        self.stack.render()
    }

    #[track_caller]
    fn of_kind(kind: ErrorKind, message: String) -> Self {
        Self::build(kind, message, kind.default_status(), true)
    }

    #[track_caller]
    fn build(kind: ErrorKind, message: String, status: StatusCode, operational: bool) -> Self {
        let stack = Stack::capture(kind.name(), &message, Location::caller());
        Self {
            kind,
            message,
            status,
            operational,
            stack,
        }
    }
}

/// Any failure caught while handling a request, before normalization.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// Already typed; passes through normalization unchanged.
    #[error(transparent)]
    App(AppError),

    /// The input parsed but broke the expected schema.
    #[error("Schema validation failed: {0}")]
    Schema(Violations),

    /// The request body could not be parsed at all.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// Anything else: a bug or an infrastructure fault.
    #[error("{message}")]
    Unexpected { message: String, stack: String },
}

impl Failure {
    /// Unexpected failure whose stack points at the caller.
    #[track_caller]
    pub fn unexpected(message: impl Into<String>) -> Self {
        let message = message.into();
        let stack = Stack::capture("Error", &message, Location::caller()).render();
        Self::Unexpected { message, stack }
    }

    /// Status the failure will be rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::App(e) => e.status(),
            Self::Schema(_) | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is an anticipated one.
    pub fn is_operational(&self) -> bool {
        match self {
            Self::App(e) => e.is_operational(),
            Self::Schema(_) | Self::MalformedBody(_) => true,
            Self::Unexpected { .. } => false,
        }
    }
}

impl From<AppError> for Failure {
    fn from(error: AppError) -> Self {
        Self::App(error)
    }
}

impl From<Violations> for Failure {
    fn from(violations: Violations) -> Self {
        Self::Schema(violations)
    }
}

impl From<JsonRejection> for Failure {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonSyntaxError(e) => Self::MalformedBody(e.body_text()),
            JsonRejection::JsonDataError(e) => {
                Self::Schema(violation_from_serde_message(&e.body_text()).into())
            }
            JsonRejection::MissingJsonContentType(e) => {
                Self::App(AppError::new(e.body_text(), StatusCode::UNSUPPORTED_MEDIA_TYPE))
            }
            other => Self::App(AppError::new(other.body_text(), other.status())),
        }
    }
}

impl From<serde_json::Error> for Failure {
    fn from(error: serde_json::Error) -> Self {
        match error.classify() {
            Category::Syntax | Category::Eof => Self::MalformedBody(error.to_string()),
            Category::Data => Self::Schema(violation_from_serde_message(&error.to_string()).into()),
            Category::Io => Self::unexpected(error.to_string()),
        }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Self::Unexpected {
            message: error.to_string(),
            stack: format!("{error:?}"),
        }
    }
}

/// Tags the response with the failure; the terminal stage renders the body.
impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        Failure::from(self).into_response()
    }
}

/// Map any caught failure to exactly one [`AppError`].
///
/// - schema violations → validation error listing `path: reason` pairs
/// - malformed body → validation error `"Invalid JSON"`
/// - typed errors → unchanged
/// - anything else → non-operational 500, message hidden in production
pub fn normalize(failure: Failure, environment: Environment) -> AppError {
    match failure {
        Failure::Schema(violations) => AppError::validation(violations.summary()),
        Failure::MalformedBody(_) => AppError::validation(INVALID_JSON_MESSAGE),
        Failure::App(error) => error,
        Failure::Unexpected { message, stack } => {
            let message = if environment.is_production() {
                GENERIC_ERROR_MESSAGE.to_string()
            } else {
                message
            };
            AppError::unexpected(message).with_stack(stack)
        }
    }
}

/// Build the response body for a normalized error.
///
/// The stack is only included outside production.
pub fn format_error(error: &AppError, environment: Environment) -> ErrorBody {
    ErrorBody {
        status: "error".to_string(),
        message: error.message().to_string(),
        stack: (!environment.is_production()).then(|| error.stack()),
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

/// Creation site of an error plus an unresolved backtrace.
#[derive(Debug, Clone)]
struct Stack {
    origin: String,
    backtrace: Option<Arc<Backtrace>>,
}

impl Stack {
    fn capture(name: &str, message: &str, location: &Location<'_>) -> Self {
        let backtrace = Backtrace::capture();
        Self {
            origin: format!("{name}: {message}\n    at {location}"),
            backtrace: (backtrace.status() == BacktraceStatus::Captured)
                .then(|| Arc::new(backtrace)),
        }
    }

    fn render(&self) -> String {
        match &self.backtrace {
            Some(backtrace) => format!("{}\n{backtrace}", self.origin),
            None => self.origin.clone(),
        }
    }
}

/// Turn a serde data error into a field violation without leaking type names.
fn violation_from_serde_message(msg: &str) -> Violation {
    if let Some(field) = backticked(msg) {
        if msg.contains("missing field") {
            return Violation::new(field, "Required");
        }
        if msg.contains("unknown field") {
            return Violation::new(field, "Unrecognized field");
        }
    }

    if msg.contains("invalid type") {
        return Violation::new("body", "Invalid data type");
    }

    if msg.contains("invalid value") || msg.contains("unknown variant") {
        return Violation::new("body", "Invalid value");
    }

    Violation::new("body", "Invalid request format")
}

fn backticked(msg: &str) -> Option<&str> {
    let start = msg.find('`')?;
    let rest = msg.get(start + 1..)?;
    let end = rest.find('`')?;
    rest.get(..end)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_kind_defaults() {
        let cases = [
            (ErrorKind::NotFound, 404, "Resource not found"),
            (ErrorKind::Validation, 400, "Validation failed"),
            (ErrorKind::Unauthorized, 401, "Unauthorized"),
            (ErrorKind::Forbidden, 403, "Forbidden"),
        ];

        for (kind, status, message) in cases {
            let err = AppError::from_kind(kind);
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.message(), message);
            assert!(err.is_operational());
        }
    }

    #[test]
    fn test_base_error_defaults() {
        let err = AppError::generic("boom");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_operational());
        assert_eq!(err.kind(), ErrorKind::Generic);

        let err = AppError::new("slow down", StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_stack_records_construction_site() {
        let err = AppError::not_found("missing");
        assert!(err.stack().starts_with("NotFoundError: missing"));
        assert!(err.stack().contains("src/error.rs"));
    }

    #[test]
    fn test_replaced_stack_drops_backtrace() {
        let err = AppError::unexpected("boom").with_stack("Panic: boom\n    at src/lib.rs:1:1");
        assert_eq!(err.stack(), "Panic: boom\n    at src/lib.rs:1:1");
        assert!(err.stack.backtrace.is_none());

        let kept = AppError::unexpected("boom").with_stack("");
        assert!(kept.stack().starts_with("AppError: boom"));
    }

    #[test]
    fn test_clone_shares_captured_backtrace() {
        let err = AppError::not_found("missing");
        let copy = err.clone();

        match (&err.stack.backtrace, &copy.stack.backtrace) {
            (Some(a), Some(b)) => assert!(Arc::ptr_eq(a, b)),
            (None, None) => {}
            _ => panic!("clone changed backtrace presence"),
        }
        assert_eq!(err.stack(), copy.stack());
    }

    #[test]
    fn test_normalize_schema_violations() {
        let mut violations = Violations::new();
        violations.push("name", "Required");
        violations.push("count", "Expected number");

        let err = normalize(violations.into(), Environment::Development);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "name: Required, count: Expected number");
    }

    #[test]
    fn test_normalize_malformed_body() {
        let failure = Failure::MalformedBody("expected value at line 1 column 2".into());
        let err = normalize(failure, Environment::Production);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), INVALID_JSON_MESSAGE);
    }

    #[test]
    fn test_normalize_passes_typed_error_through() {
        let original = AppError::forbidden("no access");
        let err = normalize(original.clone().into(), Environment::Production);
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.message(), "no access");
        assert_eq!(err.stack(), original.stack());
    }

    #[test]
    fn test_normalize_unexpected_hides_message_in_production() {
        let err = normalize(
            Failure::unexpected("db password is hunter2"),
            Environment::Production,
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_operational());
        assert_eq!(err.message(), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_normalize_unexpected_keeps_message_outside_production() {
        for environment in [Environment::Development, Environment::Test] {
            let err = normalize(Failure::unexpected("disk full"), environment);
            assert_eq!(err.message(), "disk full");
            assert!(!err.is_operational());
            assert!(err.stack().contains("disk full"));
        }
    }

    #[test]
    fn test_format_error_stack_only_outside_production() {
        let err = AppError::validation("bad");

        let body = format_error(&err, Environment::Development);
        assert_eq!(body.status, "error");
        assert_eq!(body.message, "bad");
        assert!(body.stack.is_some());

        let body = format_error(&err, Environment::Production);
        assert!(body.stack.is_none());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("stack").is_none());
    }

    #[test]
    fn test_serde_syntax_error_is_malformed_body() {
        let err = serde_json::from_str::<Sample>("{not json").unwrap_err();
        assert!(matches!(Failure::from(err), Failure::MalformedBody(_)));

        let err = serde_json::from_str::<Sample>("{\"name\":").unwrap_err();
        assert!(matches!(Failure::from(err), Failure::MalformedBody(_)));
    }

    #[test]
    fn test_serde_data_error_is_schema_violation() {
        let err = serde_json::from_str::<Sample>(r#"{"count": 1}"#).unwrap_err();
        let Failure::Schema(violations) = Failure::from(err) else {
            panic!("expected schema failure");
        };
        assert_eq!(violations.summary(), "name: Required");

        let err = serde_json::from_str::<Sample>(r#"{"name": "a", "count": "x"}"#).unwrap_err();
        let Failure::Schema(violations) = Failure::from(err) else {
            panic!("expected schema failure");
        };
        assert_eq!(violations.summary(), "body: Invalid data type");
    }

    #[test]
    fn test_anyhow_error_is_unexpected() {
        let failure = Failure::from(anyhow::anyhow!("connection refused"));
        assert!(!failure.is_operational());
        assert_eq!(failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failure.to_string(), "connection refused");
    }

    #[test]
    fn test_into_response_tags_failure() {
        let response = AppError::unauthorized("who are you").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let failure = response.extensions().get::<Failure>().unwrap();
        assert_eq!(failure.to_string(), "who are you");
    }
}
