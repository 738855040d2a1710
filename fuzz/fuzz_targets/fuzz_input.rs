//! Fuzz testing for untrusted input handling.
//!
//! Exercises the two places where outside input is parsed:
//!
//! - environment variables through `Config::from_lookup`
//! - request bodies through the serde error → `Failure` → `AppError` pipeline
//!
//! Neither may panic, and a rejected config must always name at least one
//! variable.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_input -- -max_total_time=60
//! ```

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use interview_helper_api::config::ConfigError;
use interview_helper_api::error::{format_error, normalize};
use interview_helper_api::{Config, Environment, Failure};
use libfuzzer_sys::fuzz_target;

const VARIABLES: [&str; 13] = [
    "HOST",
    "PORT",
    "APP_ENV",
    "LOG_LEVEL",
    "LOG_FILE_ENABLED",
    "LOG_FILE_PATH",
    "RATE_LIMIT_WINDOW_MS",
    "RATE_LIMIT_MAX_REQUESTS",
    "MAX_REQUEST_BODY_SIZE",
    "CORS_ALLOWED_ORIGINS",
    "TRUST_PROXY",
    "SHUTDOWN_TIMEOUT_MS",
    "METRICS_PORT",
];

#[derive(Debug, Arbitrary)]
struct Input {
    env: Vec<(u8, String)>,
    body: Vec<u8>,
    production: bool,
}

fuzz_target!(|input: Input| {
    let env: HashMap<&str, String> = input
        .env
        .into_iter()
        .map(|(index, value)| (VARIABLES[usize::from(index) % VARIABLES.len()], value))
        .collect();

    match Config::from_lookup(|name| env.get(name).cloned()) {
        Ok(config) => {
            assert!(config.rate_limit_max_requests > 0);
            assert!(!config.rate_limit_window.is_zero());
            assert!(!config.shutdown_grace_period.is_zero());
        }
        Err(ConfigError::Invalid(violations)) => assert!(!violations.is_empty()),
    }

    let environment = if input.production {
        Environment::Production
    } else {
        Environment::Development
    };

    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&input.body) {
        let error = normalize(Failure::from(e), environment);
        let body = format_error(&error, environment);
        assert_eq!(body.status, "error");
        assert_eq!(body.stack.is_none(), input.production);
    }
});
