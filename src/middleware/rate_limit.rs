//! Rate limiting middleware using a fixed-window counter per client.
//!
//! # Algorithm
//!
//! Each client key owns a `{count, window_start}` pair. On every request:
//!
//! 1. find or create the pair
//! 2. if the window has elapsed, reset the count and restart the window
//! 3. increment the count
//! 4. reject when the count exceeds the configured maximum
//!
//! The whole read-modify-write happens under one lock, so concurrent requests
//! from the same client can never undercount.
//!
//! Bursts are not smoothed across window boundaries: a client may send up to
//! `2 × max` requests in a short span straddling a reset. This is the accepted
//! trade-off of the fixed-window approach.
//!
//! # Response Headers
//!
//! Every response that passes through the limiter carries the standard
//! headers (`RateLimit-Policy`, `RateLimit-Limit`, `RateLimit-Remaining`,
//! `RateLimit-Reset` in seconds). Rejections (429) additionally carry
//! `Retry-After`. Legacy `X-RateLimit-*` headers are not sent.
//!
//! # State
//!
//! Counters live in memory only and are lost on restart. Expired windows are
//! dropped by [`FixedWindowLimiter::purge_expired`], which
//! [`crate::state::AppState`] runs periodically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;
use tower::{Layer, Service};
use tracing::warn;

use super::ip::client_addr;
use crate::metrics;
use crate::models::ErrorBody;

/// Rate limit header names.
pub mod headers {
    /// Quota and window, e.g. `100;w=15`.
    pub const POLICY: &str = "ratelimit-policy";
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "ratelimit-remaining";
    /// Seconds until the current window resets.
    pub const RESET: &str = "ratelimit-reset";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Error type for rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("maximum requests per window must be greater than 0")]
    ZeroLimit,

    #[error("rate limit window must be longer than zero")]
    ZeroWindow,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time left until the client's window restarts.
    pub reset_after: Duration,
}

impl Decision {
    /// `reset_after` rounded up to whole seconds.
    pub fn reset_secs(&self) -> u64 {
        ceil_secs(self.reset_after)
    }
}

/// Per-client fixed-window request counter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    /// Create a limiter admitting `max_requests` per client per `window`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if either value is zero.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimitError> {
        if max_requests == 0 {
            return Err(RateLimitError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }

        Ok(Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Count one request from `key` observed at `now`.
    pub fn hit(&self, key: &str, now: Instant) -> Decision {
        let mut windows = self.lock();
        let entry = windows.entry(key.to_owned()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.saturating_duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }

        entry.count = entry.count.saturating_add(1);
        let elapsed = now.saturating_duration_since(entry.started);

        Decision {
            allowed: entry.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(elapsed),
        }
    }

    /// Drop every window that has fully elapsed at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - windows.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `RateLimit-Policy` value, e.g. `100;w=15`.
    fn policy(&self) -> String {
        format!("{};w={}", self.max_requests, ceil_secs(self.window))
    }

    // A panic while holding the lock cannot leave a window half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = Arc::new(FixedWindowLimiter::new(100, Duration::from_secs(15))?);
/// let app = Router::new()
///     .route("/api", get(handler))
///     .layer(RateLimitLayer::new(limiter, false));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<FixedWindowLimiter>,
    trust_proxy: bool,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<FixedWindowLimiter>, trust_proxy: bool) -> Self {
        Self {
            limiter,
            trust_proxy,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            trust_proxy: self.trust_proxy,
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<FixedWindowLimiter>,
    trust_proxy: bool,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let client = client_addr(&req, self.trust_proxy).into_owned();
        let decision = self.limiter.hit(&client, Instant::now());
        let policy = self.limiter.policy();

        if !decision.allowed {
            warn!(
                client_addr = %client,
                path = %req.uri().path(),
                method = %req.method(),
                "Rate limit exceeded: {client}"
            );
            metrics::record_rate_limited();

            let response = rejection(&decision, &policy);
            return Box::pin(async move { Ok(response) });
        }

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            apply_headers(response.headers_mut(), &decision, &policy);
            Ok(response)
        })
    }
}

/// Build the 429 response. The body is fixed regardless of environment.
fn rejection(decision: &Decision, policy: &str) -> Response<Body> {
    let mut response =
        (StatusCode::TOO_MANY_REQUESTS, Json(ErrorBody::rate_limited())).into_response();

    let headers = response.headers_mut();
    apply_headers(headers, decision, policy);
    headers.insert(headers::RETRY_AFTER, HeaderValue::from(decision.reset_secs()));

    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &Decision, policy: &str) {
    if let Ok(value) = HeaderValue::from_str(policy) {
        headers.insert(headers::POLICY, value);
    }
    headers.insert(headers::LIMIT, HeaderValue::from(decision.limit));
    headers.insert(headers::REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(headers::RESET, HeaderValue::from(decision.reset_secs()));
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}
