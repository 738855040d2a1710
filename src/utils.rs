//! Process lifecycle helpers.
//!
//! - [`shutdown_signal`] resolves on SIGINT or SIGTERM
//! - [`supervise`] watches a background task and reports a panic through a
//!   [`CancellationToken`]
//!
//! Neither exits the process itself. `main` owns the log sink guard, so it is
//! the one place that flushes logs and picks the exit code.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::middleware::errors::panic_message;

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// A handler that cannot be installed is logged and never fires; the other
/// signal still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => warn!("Received Ctrl+C, initiating graceful shutdown..."),
        () = terminate => warn!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// Watch a background task; a panic inside it cancels `fatal`.
///
/// Request handlers have their panics turned into 500 responses, but a
/// background task has no caller to report to. The panic is logged here and
/// the server treats the cancelled token like a shutdown signal, exiting with
/// `EX_SOFTWARE` once drained.
pub async fn supervise(name: &'static str, handle: JoinHandle<()>, fatal: CancellationToken) {
    match handle.await {
        Ok(()) => {}
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            error!(
                task = name,
                "Background task panicked: {}",
                panic_message(payload.as_ref())
            );
            fatal.cancel();
        }
        Err(e) => {
            warn!(task = name, error = %e, "Background task was cancelled");
        }
    }
}
