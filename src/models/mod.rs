mod api;

pub use api::{ErrorBody, HealthResponse, RATE_LIMIT_MESSAGE};
