//! Health endpoint.
//!
//! `GET /health` reports liveness only: if the process can answer, it is up.
//! The response is never an error and carries no dependency checks.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::debug;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "ok",
///   "timestamp": "2024-01-15T10:30:00.000Z",
///   "uptime": 123.45,
///   "environment": "development",
///   "version": "1.0.0"
/// }
/// ```
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Check API health status",
    description = "Returns health information about the API",
    responses(
        (status = 200, description = "API is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime: state.uptime_seconds(),
        environment: state.config.environment,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
