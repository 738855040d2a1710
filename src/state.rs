//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers and middleware. It includes:
//!
//! - **Configuration**: the immutable runtime configuration
//! - **Rate Limiter**: per-client fixed-window counters
//! - **Start Time**: used to report uptime
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken`. Call `shutdown()` to stop them before exit. A panic in
//! one of them cancels a separate `fatal` token; [`AppState::fatal_error`]
//! resolves when that happens so the server can stop.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::middleware::{FixedWindowLimiter, RateLimitError};
use crate::utils::supervise;

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// The limiter sweeper is spawned on construction, so `new` must run inside a
/// Tokio runtime:
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Per-client request counters
    pub limiter: Arc<FixedWindowLimiter>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
    /// Cancelled when a supervised background task panics
    fatal: CancellationToken,
}

impl AppState {
    /// Create application state and start its background tasks.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if the rate limit settings are zero.
    pub fn new(config: Config) -> Result<Self, RateLimitError> {
        let limiter = Arc::new(FixedWindowLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window,
        )?);

        let state = Self {
            config: Arc::new(config),
            started_at: Instant::now(),
            limiter,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
            fatal: CancellationToken::new(),
        };

        state.spawn_limiter_sweeper();

        Ok(state)
    }

    /// Periodically drop expired rate-limit windows, once per window length.
    fn spawn_limiter_sweeper(&self) {
        let limiter = self.limiter.clone();
        let cancel = self.cancellation_token.clone();

        let handle = self.task_tracker.spawn(async move {
            let mut ticker = interval(limiter.window());
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limit sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiter.purge_expired(Instant::now());
                        trace!(
                            removed,
                            remaining = limiter.tracked_clients(),
                            "Purged expired rate limit windows"
                        );
                    }
                }
            }

            debug!("Rate limit sweeper shutting down");
        });

        self.task_tracker
            .spawn(supervise("rate-limit-sweeper", handle, self.fatal.clone()));
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Resolves once a supervised background task has panicked.
    pub async fn fatal_error(&self) {
        self.fatal.cancelled().await;
    }

    /// Whether a supervised background task has panicked.
    pub fn has_failed(&self) -> bool {
        self.fatal.is_cancelled()
    }

    /// Seconds since the state was created, with sub-second precision.
    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}
