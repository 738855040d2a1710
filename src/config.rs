//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! Every variable is checked before startup continues; all problems are reported
//! together and the process exits with `EX_CONFIG` rather than running with a
//! partially valid configuration.
//!
//! # Variables
//!
//! | Variable | Default | Notes |
//! |---|---|---|
//! | `HOST` | `0.0.0.0` | |
//! | `PORT` | `3000` | |
//! | `APP_ENV` | `development` | `development`, `production` or `test` |
//! | `LOG_LEVEL` | `info` | `error`, `warn`, `info`, `http` or `debug` |
//! | `LOG_FILE_ENABLED` | `true` | |
//! | `LOG_FILE_PATH` | `logs/app.log` | |
//! | `RATE_LIMIT_WINDOW_MS` | `15000` | must be > 0 |
//! | `RATE_LIMIT_MAX_REQUESTS` | `100` | must be > 0 |
//! | `MAX_REQUEST_BODY_SIZE` | `102400` | bytes, must be > 0 |
//! | `CORS_ALLOWED_ORIGINS` | `*` | comma-separated |
//! | `TRUST_PROXY` | `false` | honour `X-Forwarded-For` / `X-Real-IP` |
//! | `METRICS_PORT` | `0` | Prometheus listener, 0 = disabled |

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::validation::{Validate, Violations};

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variables: {0}")]
    Invalid(Violations),
}

/// Deployment mode of the running process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    /// Production hides internal error details from clients.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!(
                "Invalid enum value. Expected 'development' | 'production' | 'test', received '{other}'"
            )),
        }
    }
}

/// Log verbosity, from least to most verbose.
///
/// `Http` sits between `Info` and `Debug` and enables the per-request
/// traffic log (target [`crate::middleware::request_log::HTTP_TRAFFIC_TARGET`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Http,
    Debug,
}

impl LogLevel {
    /// `EnvFilter` directives implementing this level.
    pub fn filter_directives(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            // Successful traffic is logged at info on its own target; keep only its warnings.
            Self::Info => "info,http_traffic=warn",
            Self::Http => "info",
            Self::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "http" => Ok(Self::Http),
            "debug" => Ok(Self::Debug),
            other => Err(format!(
                "Invalid enum value. Expected 'error' | 'warn' | 'info' | 'http' | 'debug', received '{other}'"
            )),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// Constructed once at startup and shared read-only (`Arc<Config>`) afterwards.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Deployment mode (default: development)
    pub environment: Environment,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Log verbosity (default: info)
    pub log_level: LogLevel,

    /// Whether to also write logs to a rotating file (default: true)
    pub log_file_enabled: bool,

    /// Log file location; its directory is created on startup (default: "logs/app.log")
    pub log_file_path: PathBuf,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Length of one fixed rate-limit window (default: 15 seconds)
    pub rate_limit_window: Duration,

    /// Requests admitted per client within one window (default: 100)
    pub rate_limit_max_requests: u32,

    /// Use proxy headers to identify clients (default: false)
    ///
    /// Only enable behind a reverse proxy that overwrites `X-Forwarded-For`.
    pub trust_proxy: bool,

    // =========================================================================
    // Request Handling Configuration
    // =========================================================================
    /// Maximum request body size in bytes (default: 100KiB)
    pub max_request_body_size: usize,

    /// Allowed CORS origins; `*` allows any origin
    pub cors_allowed_origins: Vec<String>,

    /// How long in-flight requests may drain after a shutdown signal before
    /// the process is forced to exit (default: 10 seconds)
    pub shutdown_grace_period: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for the Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` listing every variable that failed to
    /// parse or validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = EnvReader::new(lookup);

        let config = Self {
            // Server
            host: reader.string("HOST", "0.0.0.0"),
            port: reader.parse("PORT", 3000),
            environment: reader.parse("APP_ENV", Environment::Development),

            // Logging
            log_level: reader.parse("LOG_LEVEL", LogLevel::Info),
            log_file_enabled: reader.flag("LOG_FILE_ENABLED", true),
            log_file_path: PathBuf::from(reader.string("LOG_FILE_PATH", "logs/app.log")),

            // Rate limiting
            rate_limit_window: Duration::from_millis(reader.parse("RATE_LIMIT_WINDOW_MS", 15_000)),
            rate_limit_max_requests: reader.parse("RATE_LIMIT_MAX_REQUESTS", 100),
            trust_proxy: reader.flag("TRUST_PROXY", false),

            // Request handling
            max_request_body_size: reader.parse("MAX_REQUEST_BODY_SIZE", 100 * 1024),
            cors_allowed_origins: parse_list(&reader.string("CORS_ALLOWED_ORIGINS", "*")),
            shutdown_grace_period: Duration::from_millis(
                reader.parse("SHUTDOWN_TIMEOUT_MS", 10_000),
            ),

            // Observability
            metrics_port: reader.parse("METRICS_PORT", 0),
        };

        let mut violations = reader.finish();
        if let Err(more) = config.validate() {
            violations.extend(more);
        }
        violations.into_result().map_err(ConfigError::Invalid)?;

        Ok(config)
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), Violations> {
        let mut violations = Violations::new();

        if self.rate_limit_window.is_zero() {
            violations.push("RATE_LIMIT_WINDOW_MS", "must be greater than 0");
        }

        if self.rate_limit_max_requests == 0 {
            violations.push("RATE_LIMIT_MAX_REQUESTS", "must be greater than 0");
        }

        if self.max_request_body_size == 0 {
            violations.push("MAX_REQUEST_BODY_SIZE", "must be greater than 0");
        }

        if self.shutdown_grace_period.is_zero() {
            violations.push("SHUTDOWN_TIMEOUT_MS", "must be greater than 0");
        }

        violations.into_result()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: Environment::Development,
            log_level: LogLevel::Info,
            log_file_enabled: true,
            log_file_path: PathBuf::from("logs/app.log"),
            rate_limit_window: Duration::from_millis(15_000),
            rate_limit_max_requests: 100,
            trust_proxy: false,
            max_request_body_size: 100 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            shutdown_grace_period: Duration::from_secs(10),
            metrics_port: 0,
        }
    }
}

/// Reads variables through a lookup, collecting a violation per bad value.
struct EnvReader<F> {
    lookup: F,
    violations: Violations,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            violations: Violations::new(),
        }
    }

    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parse<T>(&mut self, name: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.raw(name) {
            Some(val) => val.parse::<T>().unwrap_or_else(|e| {
                self.violations.push(name, e.to_string());
                default
            }),
            None => default,
        }
    }

    fn flag(&mut self, name: &str, default: bool) -> bool {
        match self.raw(name).as_deref() {
            Some("true") => true,
            Some("false") => false,
            Some(other) => {
                self.violations
                    .push(name, format!("Expected 'true' or 'false', received '{other}'"));
                default
            }
            None => default,
        }
    }

    fn finish(self) -> Violations {
        self.violations
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
