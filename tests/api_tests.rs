//! End-to-end tests of the HTTP surface, driven through the full middleware
//! stack with `tower::ServiceExt::oneshot` (no listener needed).
//!
//! Run with: `cargo test --test api_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::routing::get;
use serde::Deserialize;
use serde_json::Value;
use tower::ServiceExt;

use interview_helper_api::middleware::rate_limit::headers;
use interview_helper_api::middleware::{REQUEST_ID_HEADER, SECURITY_HEADERS};
use interview_helper_api::routes::with_middleware;
use interview_helper_api::{
    AppState, Config, Environment, Failure, ValidJson, Validate, Violations, build_router,
};

fn config(environment: Environment) -> Config {
    Config {
        environment,
        log_file_enabled: false,
        ..Config::default()
    }
}

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    Response {
        status,
        headers,
        body,
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn explode() -> &'static str {
    panic!("secret panic detail")
}

#[derive(Debug, Deserialize)]
struct Feedback {
    rating: u8,
}

impl Validate for Feedback {
    fn validate(&self) -> Result<(), Violations> {
        let mut violations = Violations::new();
        if self.rating > 5 {
            violations.push("rating", "must be at most 5");
        }
        violations.into_result()
    }
}

/// The production router plus a few routes that fail in different ways.
fn app_with_extras(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(interview_helper_api::handlers::health_check))
        .route("/boom", get(|| async { explode() }))
        .route(
            "/fault",
            get(|| async { Failure::from(anyhow::anyhow!("upstream timed out")) }),
        )
        .route(
            "/feedback",
            axum::routing::post(|ValidJson(f): ValidJson<Feedback>| async move {
                f.rating.to_string()
            }),
        );

    with_middleware(routes, state)
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_shape() {
    let state = AppState::new(config(Environment::Test)).unwrap();
    let app = build_router(state.clone());

    let response = send(&app, get_request("/health")).await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["environment"], "test");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptime"].as_f64().unwrap() >= 0.0);

    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(timestamp.ends_with('Z'));
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());

    state.shutdown().await;
}

#[tokio::test]
async fn test_health_is_idempotent() {
    let state = AppState::new(config(Environment::Development)).unwrap();
    let app = build_router(state.clone());

    let first = send(&app, get_request("/health")).await.json();
    let second = send(&app, get_request("/health")).await.json();

    assert_eq!(first["status"], second["status"]);
    assert_eq!(first["environment"], second["environment"]);
    assert!(second["uptime"].as_f64().unwrap() >= first["uptime"].as_f64().unwrap());

    state.shutdown().await;
}

// =============================================================================
// 404 and malformed input
// =============================================================================

#[tokio::test]
async fn test_unknown_route_is_404() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = build_router(state.clone());

    let response = send(&app, get_request("/nope")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        response.json(),
        serde_json::json!({"status": "error", "message": "Cannot find GET /nope"})
    );

    state.shutdown().await;
}

#[tokio::test]
async fn test_wrong_method_is_404() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = build_router(state.clone());

    let req = Request::builder()
        .method(Method::DELETE)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, req).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["message"], "Cannot find DELETE /health");

    state.shutdown().await;
}

#[tokio::test]
async fn test_404_includes_stack_outside_production() {
    let state = AppState::new(config(Environment::Development)).unwrap();
    let app = build_router(state.clone());

    let json = send(&app, get_request("/missing")).await.json();
    assert!(json["stack"].as_str().unwrap().contains("NotFoundError"));

    state.shutdown().await;
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = build_router(state.clone());

    let response = send(&app, json_request(Method::POST, "/anything", "{\"a\": ")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json(),
        serde_json::json!({"status": "error", "message": "Invalid JSON"})
    );

    state.shutdown().await;
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let state = AppState::new(Config {
        max_request_body_size: 16,
        ..config(Environment::Production)
    })
    .unwrap();
    let app = build_router(state.clone());

    let response = send(
        &app,
        json_request(Method::POST, "/health", r#"{"padding":"0123456789abcdef"}"#),
    )
    .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()["message"], "Request entity too large");

    state.shutdown().await;
}

#[tokio::test]
async fn test_validated_body() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = app_with_extras(state.clone());

    let ok = send(&app, json_request(Method::POST, "/feedback", r#"{"rating":4}"#)).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.text(), "4");

    let invalid = send(&app, json_request(Method::POST, "/feedback", r#"{"rating":9}"#)).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.json()["message"], "rating: must be at most 5");

    let missing = send(&app, json_request(Method::POST, "/feedback", "{}")).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()["message"], "rating: Required");

    state.shutdown().await;
}

// =============================================================================
// Unexpected failures
// =============================================================================

#[tokio::test]
async fn test_panic_hidden_in_production() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = app_with_extras(state.clone());

    let response = send(&app, get_request("/boom")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json(),
        serde_json::json!({"status": "error", "message": "Something went wrong"})
    );
    assert!(!response.text().contains("secret panic detail"));

    state.shutdown().await;
}

#[tokio::test]
async fn test_panic_detailed_in_development() {
    let state = AppState::new(config(Environment::Development)).unwrap();
    let app = app_with_extras(state.clone());

    let response = send(&app, get_request("/boom")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    let json = response.json();
    assert_eq!(json["message"], "secret panic detail");
    assert!(json["stack"].is_string());

    // The server keeps serving after a panic.
    let health = send(&app, get_request("/health")).await;
    assert_eq!(health.status, StatusCode::OK);

    state.shutdown().await;
}

#[tokio::test]
async fn test_unexpected_error_normalized() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = app_with_extras(state.clone());

    let response = send(&app, get_request("/fault")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["message"], "Something went wrong");

    state.shutdown().await;
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_rate_limit_rejects_over_max() {
    let state = AppState::new(Config {
        rate_limit_max_requests: 2,
        rate_limit_window: Duration::from_secs(60),
        ..config(Environment::Production)
    })
    .unwrap();
    let app = build_router(state.clone());

    let first = send(&app, get_request("/health")).await;
    let second = send(&app, get_request("/health")).await;
    let third = send(&app, get_request("/health")).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.headers[headers::LIMIT], "2");
    assert_eq!(first.headers[headers::REMAINING], "1");
    assert_eq!(first.headers[headers::POLICY], "2;w=60");
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.headers[headers::REMAINING], "0");

    assert_eq!(third.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        third.json(),
        serde_json::json!({
            "status": "error",
            "message": "Too many requests, please try again later."
        })
    );
    assert!(third.headers.contains_key(headers::RETRY_AFTER));
    assert!(!third.headers.contains_key("x-ratelimit-limit"));

    state.shutdown().await;
}

#[tokio::test]
async fn test_rate_limit_resets_after_window() {
    let state = AppState::new(Config {
        rate_limit_max_requests: 1,
        rate_limit_window: Duration::from_millis(100),
        ..config(Environment::Production)
    })
    .unwrap();
    let app = build_router(state.clone());

    assert_eq!(send(&app, get_request("/health")).await.status, StatusCode::OK);
    assert_eq!(
        send(&app, get_request("/health")).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(send(&app, get_request("/health")).await.status, StatusCode::OK);

    state.shutdown().await;
}

#[tokio::test]
async fn test_rate_limit_uses_proxy_address_when_trusted() {
    let state = AppState::new(Config {
        rate_limit_max_requests: 1,
        rate_limit_window: Duration::from_secs(60),
        trust_proxy: true,
        ..config(Environment::Production)
    })
    .unwrap();
    let app = build_router(state.clone());

    let from = |ip: &str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app, from("10.0.0.1")).await.status, StatusCode::OK);
    assert_eq!(send(&app, from("10.0.0.2")).await.status, StatusCode::OK);
    assert_eq!(
        send(&app, from("10.0.0.1")).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );

    state.shutdown().await;
}

// =============================================================================
// Headers and docs
// =============================================================================

#[tokio::test]
async fn test_security_headers_on_success_and_error() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = build_router(state.clone());

    for uri in ["/health", "/does-not-exist"] {
        let response = send(&app, get_request(uri)).await;
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(response.headers[name], value, "{name} on {uri}");
        }
    }

    state.shutdown().await;
}

#[tokio::test]
async fn test_request_id_echoed_or_generated() {
    let state = AppState::new(config(Environment::Production)).unwrap();
    let app = build_router(state.clone());

    let req = Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, req).await;
    assert_eq!(response.headers[REQUEST_ID_HEADER], "trace-me");

    let response = send(&app, get_request("/nope")).await;
    let generated = response.headers[REQUEST_ID_HEADER].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    state.shutdown().await;
}

#[tokio::test]
async fn test_docs_served() {
    let state = AppState::new(Config {
        port: 4321,
        ..config(Environment::Development)
    })
    .unwrap();
    let app = build_router(state.clone());

    let page = send(&app, get_request("/api-docs")).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.text().contains("SwaggerUIBundle"));

    let document = send(&app, get_request("/api-docs/openapi.json")).await;
    assert_eq!(document.status, StatusCode::OK);
    let json = document.json();
    assert_eq!(json["info"]["title"], "Interview Helper API");
    assert_eq!(json["servers"][0]["url"], "http://localhost:4321");
    assert!(json["paths"]["/health"].is_object());

    state.shutdown().await;
}
