use axum::Router;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};

/// Binds and serves the API with graceful shutdown.
///
/// The server stops when SIGINT/SIGTERM arrives or when `shutdown_token` is
/// cancelled by another subsystem; the signal path also cancels the token so
/// collectors and workers wind down together.
pub async fn serve(
    app: Router,
    host: &str,
    port: u16,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let bind_addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| Error::Fatal(format!("failed to bind to {bind_addr}: {e}")))?;

    info!("API server listening on {}", listener.local_addr()?);
    info!("  - GET  /api/v1/logs           (query entries)");
    info!("  - POST /api/v1/logs           (store one entry)");
    info!("  - POST /api/v1/logs/batch     (store many entries)");
    info!("  - POST /api/v1/query          (structured query)");
    info!("  - POST /api/v1/query/analyze  (aggregate analysis)");
    info!("  - GET  /api/v1/health         (health check)");
    info!("  - GET  /metrics               (prometheus metrics)");

    let token = shutdown_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown_signal() => token.cancel(),
                () = token.cancelled() => {}
            }
        })
        .await?;

    info!("server shutdown complete");
    Ok(())
}

/// Waits for SIGTERM or SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}
