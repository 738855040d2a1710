//! Prometheus metrics for HTTP traffic.
//!
//! Metrics are exposed on a dedicated listener when `METRICS_PORT` is set to a
//! non-zero value. Recording functions are safe to call without an installed
//! exporter; they become no-ops.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `http_requests_total` - Completed requests (labels: method, status)
//! - `rate_limit_rejections_total` - Requests rejected with 429
//!
//! ## Histograms
//! - `http_request_duration_seconds` - Request duration (labels: method, status)

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "rate_limit_rejections_total";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. the port is
/// taken or a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::HTTP_REQUESTS_TOTAL,
        "Total number of completed HTTP requests"
    );
    describe_counter!(
        names::RATE_LIMIT_REJECTIONS_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    counter!(names::HTTP_REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, "method" => method.to_string(), "status" => status)
        .record(duration_secs);
}

/// Record a rate limiter rejection.
pub fn record_rate_limited() {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL).increment(1);
}
