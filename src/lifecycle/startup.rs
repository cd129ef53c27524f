//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start the metrics exporter when enabled
//! - Bind the listener and hand it to the server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use thiserror::Error;

use crate::config::{GatewayConfig, ValidationError};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::observability::metrics::{self, MetricsError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid route table: {0}")]
    Routes(#[from] ValidationError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Run the gateway until `shutdown` fires and the drain completes.
pub async fn run(config: GatewayConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        metrics::init_metrics(&config.observability.metrics_address)?;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        routes = config.routes.len(),
        connect_timeout_ms = config.timeouts.connect_ms,
        first_byte_timeout_ms = config.timeouts.first_byte_ms,
        drain_deadline_ms = config.lifecycle.drain_deadline_ms,
        "Configuration loaded"
    );

    let server = HttpServer::new(config.clone())?;
    let listener = Listener::bind(&config.listener).await?;
    server.serve(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
