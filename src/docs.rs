//! OpenAPI document and Swagger UI page.
//!
//! The document is generated from the handler and model types with `utoipa`.
//! Both the JSON and the HTML page are rendered once when the router is built
//! and served from memory afterwards.
//!
//! - `GET /api-docs` - Swagger UI (assets loaded from a CDN)
//! - `GET /api-docs/openapi.json` - the raw OpenAPI document

use axum::Router;
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use utoipa::openapi::content::ContentBuilder;
use utoipa::openapi::response::ResponseBuilder;
use utoipa::openapi::server::ServerBuilder;
use utoipa::openapi::{Ref, RefOr};
use utoipa::{Modify, OpenApi};

use crate::handlers::health;
use crate::models::{ErrorBody, HealthResponse};

/// Path of the Swagger UI page.
pub const DOCS_PATH: &str = "/api-docs";

/// Path of the OpenAPI JSON document.
pub const SPEC_PATH: &str = "/api-docs/openapi.json";

const SWAGGER_UI_VERSION: &str = "5.18.2";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Interview Helper API",
        version = "1.0.0",
        description = "A production-ready Rust API for interview assistance",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
        contact(name = "API Support", email = "support@example.com")
    ),
    paths(health::health_check),
    components(schemas(HealthResponse, ErrorBody)),
    tags((name = "Health", description = "API health check endpoints")),
    modifiers(&SharedResponses)
)]
pub struct ApiDoc;

/// Reusable `NotFound` and `InternalError` responses.
struct SharedResponses;

impl Modify for SharedResponses {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        for (name, description) in [
            ("NotFound", "The specified resource was not found"),
            ("InternalError", "Internal server error"),
        ] {
            let response = ResponseBuilder::new()
                .description(description)
                .content(
                    "application/json",
                    ContentBuilder::new()
                        .schema(Some(Ref::from_schema_name("ErrorBody")))
                        .build(),
                )
                .build();
            components
                .responses
                .insert(name.to_string(), RefOr::T(response));
        }
    }
}

/// Full document, with the local server entry for `port`.
pub fn openapi_document(port: u16) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![
        ServerBuilder::new()
            .url(format!("http://localhost:{port}"))
            .description(Some("Development server"))
            .build(),
    ]);
    doc
}

/// Routes serving the document and the Swagger UI page.
pub fn router<S>(port: u16) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let doc = openapi_document(port);
    let json = Bytes::from(
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string()),
    );
    let html = Bytes::from(swagger_html(&doc.info.title, &json));

    Router::new()
        .route(
            DOCS_PATH,
            get(move || {
                let html = html.clone();
                async move { Html(html) }
            }),
        )
        .route(
            SPEC_PATH,
            get(move || {
                let json = json.clone();
                async move { ([(CONTENT_TYPE, "application/json")], json).into_response() }
            }),
        )
}

/// Swagger UI page with the document embedded inline.
fn swagger_html(title: &str, spec_json: &[u8]) -> String {
    let spec_json = String::from_utf8_lossy(spec_json);
    let version = SWAGGER_UI_VERSION;

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - Swagger UI</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui.css" />
    <style>
        html {{ box-sizing: border-box; overflow-y: scroll; }}
        *, *:before, *:after {{ box-sizing: inherit; }}
        body {{ margin: 0; background: #fafafa; }}
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {{
            window.ui = SwaggerUIBundle({{
                spec: {spec_json},
                dom_id: '#swagger-ui',
                deepLinking: true,
                docExpansion: 'list',
                displayRequestDuration: true,
                presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                layout: 'StandaloneLayout'
            }});
        }};
    </script>
</body>
</html>"##
    )
}
