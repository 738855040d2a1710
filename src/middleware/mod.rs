//! HTTP middleware for observability, hardening, rate limiting and errors.
//!
//! # Architecture
//!
//! ```text
//! Request → Request Log → Security Headers → CORS → Error Stage → Catch Panic
//!              ↓                                        ↑
//!        X-Request-Id                          Failure → JSON body
//!                                                       ↑
//!           Handler ← Rate Limiter ← JSON Body Parsing ─┘
//!                          ↓                ↓
//!                  429 Too Many     400 Invalid JSON / 413
//! ```
//!
//! The order is fixed in [`crate::routes::with_middleware`].

pub mod body;
pub mod errors;
pub mod ip;
pub mod rate_limit;
pub mod request_log;
pub mod security;

pub use body::parse_json_body;
pub use errors::{failure_from_panic, handle_errors, not_found};
pub use ip::{UNKNOWN_CLIENT, client_addr};
pub use rate_limit::{Decision, FixedWindowLimiter, RateLimitError, RateLimitLayer};
pub use request_log::{HTTP_TRAFFIC_TARGET, REQUEST_ID_HEADER, RequestLogLayer};
pub use security::{SECURITY_HEADERS, with_security_headers};
