//! Request logging and request ID propagation.
//!
//! Every request produces exactly one completion record:
//!
//! ```text
//! GET /health 200 3ms
//! ```
//!
//! The record is emitted when the inner stack produces a response. If the
//! request future is dropped first (the client disconnected mid-flight), the
//! drop guard emits it instead with status `499`.
//!
//! Records go to the [`HTTP_TRAFFIC_TARGET`] target: `info` for statuses below
//! 400, `warn` otherwise. Structured fields carry method, url, status code,
//! duration, client address, user agent and request id.
//!
//! # Request IDs
//!
//! A client-supplied `X-Request-Id` is kept; otherwise a UUIDv4 is generated.
//! The ID is written into the request headers (so handlers can read it),
//! echoed on the response, and recorded on a `request` span wrapping the rest
//! of the stack.
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:3000/health
//! ```

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{HeaderValue, USER_AGENT};
use axum::http::{Method, Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::ip::client_addr;
use crate::metrics;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tracing target for per-request completion records.
pub const HTTP_TRAFFIC_TARGET: &str = "http_traffic";

/// Status recorded when the client goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Request logging layer for Tower middleware stack.
#[derive(Clone, Default)]
pub struct RequestLogLayer {
    trust_proxy: bool,
}

impl RequestLogLayer {
    pub fn new(trust_proxy: bool) -> Self {
        Self { trust_proxy }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            trust_proxy: self.trust_proxy,
        }
    }
}

/// Request logging service wrapper.
#[derive(Clone)]
pub struct RequestLogService<S> {
    inner: S,
    trust_proxy: bool,
}

impl<S> Service<Request<Body>> for RequestLogService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_id = extract_or_generate_request_id(&req);
        let header_value = HeaderValue::from_str(&request_id).ok();
        if let Some(value) = &header_value {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        }

        let span = info_span!("request", request_id = %request_id);
        let pending = PendingLog::new(RequestRecord::from_request(
            &req,
            self.trust_proxy,
            request_id,
        ));

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let mut response = inner.call(req).await?;

                if let Some(value) = header_value {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }

                pending.finish(response.status().as_u16());
                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Extract request ID from headers or generate a new one.
fn extract_or_generate_request_id<B>(req: &Request<B>) -> String {
    if let Some(header_value) = req.headers().get(REQUEST_ID_HEADER)
        && let Ok(value) = header_value.to_str()
        && !value.is_empty()
    {
        return value.to_string();
    }

    Uuid::new_v4().to_string()
}

/// Everything known about a request before it runs.
#[derive(Debug)]
struct RequestRecord {
    method: Method,
    url: String,
    client: String,
    user_agent: String,
    request_id: String,
    started: Instant,
}

impl RequestRecord {
    fn from_request<B>(req: &Request<B>, trust_proxy: bool, request_id: String) -> Self {
        Self {
            method: req.method().clone(),
            url: req
                .uri()
                .path_and_query()
                .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string()),
            client: client_addr(req, trust_proxy).into_owned(),
            user_agent: req
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            request_id,
            started: Instant::now(),
        }
    }

    fn emit(self, status: u16) {
        let elapsed = self.started.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let Self {
            method,
            url,
            client,
            user_agent,
            request_id,
            ..
        } = self;

        if status >= 400 {
            warn!(
                target: HTTP_TRAFFIC_TARGET,
                method = %method,
                url = %url,
                status_code = status,
                duration_ms,
                client_addr = %client,
                user_agent = %user_agent,
                request_id = %request_id,
                "{method} {url} {status} {duration_ms}ms"
            );
        } else {
            info!(
                target: HTTP_TRAFFIC_TARGET,
                method = %method,
                url = %url,
                status_code = status,
                duration_ms,
                client_addr = %client,
                user_agent = %user_agent,
                request_id = %request_id,
                "{method} {url} {status} {duration_ms}ms"
            );
        }

        metrics::record_request(method.as_str(), status, elapsed.as_secs_f64());
    }
}

/// Drop guard that guarantees one completion record per request.
struct PendingLog(Option<RequestRecord>);

impl PendingLog {
    fn new(record: RequestRecord) -> Self {
        Self(Some(record))
    }

    fn finish(mut self, status: u16) {
        if let Some(record) = self.0.take() {
            record.emit(status);
        }
    }
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        if let Some(record) = self.0.take() {
            record.emit(CLIENT_CLOSED_REQUEST);
        }
    }
}
