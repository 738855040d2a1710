//! # Interview Helper API
//!
//! A minimal, production-shaped HTTP service scaffold built on Axum:
//!
//! - **Health**: `GET /health` with uptime, environment and version
//! - **Uniform Errors**: every failure, including panics and unknown routes,
//!   becomes `{"status":"error","message":...}`
//! - **Rate Limiting**: fixed-window counter per client
//! - **Observability**: request IDs, per-request log records, optional
//!   Prometheus metrics, rotating JSON log file
//! - **Documentation**: OpenAPI document and Swagger UI at `/api-docs`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Log → Headers → CORS → Errors → Body → Limit)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, docs, 404 fallback)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AppState (config, limiter, background tasks)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interview_helper_api::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! PORT=8080 APP_ENV=production RATE_LIMIT_MAX_REQUESTS=50 cargo run
//! ```

pub mod config;
pub mod docs;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::{Config, Environment};
pub use error::{AppError, AppResult, Failure};
pub use extract::ValidJson;
pub use routes::{build_router, with_middleware};
pub use server::{ServeError, serve};
pub use state::AppState;
pub use validation::{Validate, Violations};
