use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Json, Router, routing::get};
use config::HealthConfig;
use http::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum HealthState {
    /// The gateway accepts requests.
    Healthy,
}

/// Handles health check requests and returns the current health status of the server.
pub(crate) async fn health() -> (StatusCode, Json<HealthState>) {
    (StatusCode::OK, Json(HealthState::Healthy))
}

/// Serves the health endpoint on its own address until shutdown.
pub(super) async fn bind_health_endpoint(
    addr: SocketAddr,
    health_config: HealthConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let path = &health_config.path;
    let app = Router::new().route(path, get(health));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow!("Failed to bind the health endpoint to {addr}: {e}"))?;

    log::info!("Health check endpoint exposed at http://{addr}{path}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"))?;

    Ok(())
}
