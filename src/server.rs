//! HTTP serving with graceful shutdown and a bounded drain period.
//!
//! # Shutdown Sequence
//!
//! ```text
//! signal ──► stop accepting ──► drain in-flight requests ──► Ok(())
//!                   │
//!                   └── grace period elapses first ──► Err(GraceExpired)
//! ```
//!
//! The caller decides what an expired grace period means; the binary exits
//! with `EX_SOFTWARE`, abandoning whatever is still running.

use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Serving stopped abnormally.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Server error: {0}")]
    Io(#[from] io::Error),

    #[error("In-flight requests did not finish within {0:?}")]
    GraceExpired(Duration),
}

/// Serve `router` on `listener` until `shutdown` resolves, then drain.
///
/// Connections carry their peer address (`ConnectInfo<SocketAddr>`), which
/// the rate limiter and request log use to identify clients.
///
/// # Errors
///
/// - `ServeError::Io` if the server fails
/// - `ServeError::GraceExpired` if requests are still running `grace` after
///   the shutdown signal
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
    grace: Duration,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let draining = CancellationToken::new();
    let trigger = draining.clone();

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        info!(
            grace_secs = grace.as_secs_f64(),
            "Stopped accepting connections, draining in-flight requests"
        );
        trigger.cancel();
    })
    .into_future();

    let deadline = async {
        draining.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result?;
            info!("All connections drained");
            Ok(())
        }
        () = deadline => {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "Could not close connections in time, forcefully shutting down"
            );
            Err(ServeError::GraceExpired(grace))
        }
    }
}
