use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};

use interview_helper_api::utils;
use interview_helper_api::{AppState, Config, build_router, metrics, serve, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    // Logging is configured from the same variables, so report problems plainly.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    let log_guard = match telemetry::init(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(exitcode::CANTCREAT as u8);
        }
    };
    telemetry::install_panic_hook();

    info!(
        "Starting Interview Helper API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = run(config).await;

    // Flush the file sink; `process::exit` below skips destructors.
    drop(log_guard);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        // Returning would drop the runtime, which joins worker threads that
        // may still be stuck in abandoned requests.
        Err(exit_code) => std::process::exit(exit_code),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        log_file = config.log_file_enabled,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let state = AppState::new(config.clone()).map_err(|e| {
        error!("Invalid rate limit configuration: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    let addr = config.server_addr();
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!(
        "Server running on port {} in {} mode",
        config.port, config.environment
    );
    info!(
        "API Documentation available at http://localhost:{}/api-docs",
        config.port
    );
    info!("API endpoints:");
    info!("  GET  /health                - Health check");
    info!("  GET  /api-docs              - Swagger UI");
    info!("  GET  /api-docs/openapi.json - OpenAPI document");

    let shutdown = {
        let state = state.clone();
        async move {
            tokio::select! {
                () = utils::shutdown_signal() => {}
                () = state.fatal_error() => {
                    error!("Background task failed, shutting down");
                }
            }
        }
    };

    let result = serve(listener, app, shutdown, config.shutdown_grace_period).await;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    result.map_err(|e| {
        error!("{e}");
        exitcode::SOFTWARE
    })?;

    if state.has_failed() {
        return Err(exitcode::SOFTWARE);
    }

    info!("Server shutdown complete");
    Ok(())
}
