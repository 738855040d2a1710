//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request Log    │ ← X-Request-Id, one completion record per request
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Security Headers │ ← nosniff, HSTS, frame options, ...
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Error Stage    │ ← renders every Failure as the JSON error body
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Catch Panic    │ ← panic → 500
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  JSON Body Parse │ ← 400 Invalid JSON / 413 too large
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if exceeded
//! └────────┬─────────┘
//!          ▼
//!   Handler / 404 fallback
//! ```
//!
//! # Routes
//!
//! - `GET /health` - Liveness and uptime
//! - `GET /api-docs` - Swagger UI
//! - `GET /api-docs/openapi.json` - OpenAPI document
//! - anything else - 404 error body

use axum::Router;
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::docs;
use crate::handlers;
use crate::middleware::{
    RateLimitLayer, RequestLogLayer, failure_from_panic, handle_errors, not_found,
    parse_json_body, with_security_headers,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(docs::router(state.config.port));

    with_middleware(routes, state)
}

/// Attach the fallback, the full middleware stack and `state` to `routes`.
///
/// Split out from [`build_router`] so additional routes get exactly the same
/// treatment as the built-in ones.
pub fn with_middleware(routes: Router<AppState>, state: AppState) -> Router {
    let config = state.config.clone();

    info!(
        max_requests = config.rate_limit_max_requests,
        window_ms = u64::try_from(config.rate_limit_window.as_millis()).unwrap_or(u64::MAX),
        trust_proxy = config.trust_proxy,
        "Rate limiting enabled"
    );
    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );

    // Applied bottom to top: the last layer runs first.
    let router = routes
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(RateLimitLayer::new(state.limiter.clone(), config.trust_proxy))
        .layer(axum::middleware::from_fn_with_state(
            config.max_request_body_size,
            parse_json_body,
        ))
        .layer(CatchPanicLayer::custom(failure_from_panic))
        .layer(axum::middleware::from_fn_with_state(
            config.environment,
            handle_errors,
        ))
        .layer(build_cors_layer(&config.cors_allowed_origins));

    with_security_headers(router)
        .layer(RequestLogLayer::new(config.trust_proxy))
        .with_state(state)
}

/// Build CORS layer from configuration.
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
