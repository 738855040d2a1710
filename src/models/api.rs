use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use utoipa::ToSchema;

use crate::config::Environment;

/// Fixed message returned with every 429 response.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// Health check response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving requests
    #[schema(example = "ok")]
    pub status: String,
    /// Time the check was performed (ISO-8601, millisecond precision)
    #[serde(serialize_with = "iso_millis")]
    #[schema(example = "2023-01-01T00:00:00.000Z")]
    pub timestamp: DateTime<Utc>,
    /// Seconds since the process started
    #[schema(example = 123.45)]
    pub uptime: f64,
    /// Deployment mode the process runs in
    pub environment: Environment,
    /// Service version
    #[schema(example = "1.0.0")]
    pub version: String,
}

/// Uniform error response body.
///
/// Every failure on the HTTP surface is rendered in this shape.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Always `"error"`
    #[schema(example = "error")]
    pub status: String,
    /// Client-safe description of the failure
    #[schema(example = "Error message")]
    pub message: String,
    /// Stack trace; omitted in production
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    /// Body sent when a client exceeds its rate limit.
    pub fn rate_limited() -> Self {
        Self {
            status: "error".to_string(),
            message: RATE_LIMIT_MESSAGE.to_string(),
            stack: None,
        }
    }
}

fn iso_millis<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}
