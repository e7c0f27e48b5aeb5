//! Tally server library.
//!
//! Provides a reusable server function to serve Tally either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod health;

use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Router, routing::get};
use config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Configuration for serving Tally.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Tally TOML configuration.
    pub config: Config,
    /// Stops the server gracefully once cancelled. In-flight streams are
    /// allowed to finish.
    pub shutdown_signal: CancellationToken,
}

/// Starts and runs the Tally server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let _telemetry = match &config.telemetry {
        Some(telemetry_config) => Some(telemetry::init(telemetry_config).await?),
        None => {
            log::debug!("No telemetry configured, metrics are not exported");
            None
        }
    };

    let mut app = Router::new();
    let mut llm_exposed = false;

    if config.llm.enabled() {
        match llm::router(config.llm.clone(), &config.storage).await {
            Ok(llm_router) => {
                app = app.merge(llm_router);
                llm_exposed = true;
            }
            Err(e) => {
                log::error!("Failed to initialize LLM router: {e}");
            }
        }
    } else {
        log::debug!("LLM endpoints are disabled and will not be exposed");
    }

    if config.server.health.enabled {
        if let Some(listen) = config.server.health.listen {
            tokio::spawn(health::bind_health_endpoint(
                listen,
                config.server.health.clone(),
                shutdown_signal.clone(),
            ));
        } else {
            app = app.route(&config.server.health.path, get(health::health));
        }
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if llm_exposed {
        log::info!("LLM endpoints available at: http://{listen_address}{}", config.llm.path);
    } else {
        log::warn!("Server starting with no functional endpoints. Configure provider credentials to enable streaming.");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal.cancelled_owned())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    log::info!("Server stopped");

    Ok(())
}
