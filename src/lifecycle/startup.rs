//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when enabled
//! - Build the upstream client
//! - Acquire the listener (inherited or bound)
//! - Serve until shutdown, then give in-flight connections time to finish
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener is acquired last, so traffic arrives only once everything else is ready

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::ServiceConfig;
use crate::lifecycle::ShutdownSignal;
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;
use crate::server::{ConnectionServer, HandlerSettings, ServerError};
use crate::upstream::{HasteClient, PublishError, Publisher};

/// Errors that prevent the service from serving at all.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to create upstream client: {0}")]
    Upstream(#[source] PublishError),

    #[error("failed to start listener: {0}")]
    Listener(#[from] ListenerError),

    #[error("invalid metrics address '{address}': {source}")]
    MetricsAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[source] metrics_exporter_prometheus::BuildError),
}

/// A fully started service, ready to accept connections.
pub struct Service {
    server: ConnectionServer,
    drain_timeout: Duration,
}

impl Service {
    /// Start with the haste-server client described by `config.upstream`.
    pub async fn start(config: &ServiceConfig) -> Result<Self, StartupError> {
        if config.observability.metrics_enabled {
            let addr: SocketAddr = config.observability.metrics_address.parse().map_err(|source| {
                StartupError::MetricsAddress {
                    address: config.observability.metrics_address.clone(),
                    source,
                }
            })?;
            metrics::init_metrics(addr).map_err(StartupError::Metrics)?;
        }

        let client = HasteClient::new(&config.upstream).map_err(StartupError::Upstream)?;
        tracing::info!(documents_url = %client.documents_url(), "Upstream client ready");

        Self::with_publisher(config, Arc::new(client)).await
    }

    /// Start with an arbitrary publisher.
    pub async fn with_publisher(
        config: &ServiceConfig,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, StartupError> {
        let listener = Listener::acquire(&config.listener).await?;
        let server = ConnectionServer::new(listener, publisher, HandlerSettings::from_config(config));
        Ok(Self {
            server,
            drain_timeout: config.shutdown.drain_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.server.local_addr()
    }

    /// Run the accept loop until `shutdown` fires, then wait for in-flight connections.
    pub async fn serve(mut self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        self.server.run(shutdown).await?;

        let tracker = self.server.tracker();
        // Closes the listening socket before draining.
        drop(self.server);

        if tracker.active_count() > 0 {
            tracing::info!(
                in_flight = tracker.active_count(),
                timeout = ?self.drain_timeout,
                "Waiting for in-flight connections"
            );
            if !tracker.wait_for_drain(self.drain_timeout).await {
                tracing::warn!(
                    in_flight = tracker.active_count(),
                    "Drain timeout elapsed, abandoning connections"
                );
            }
        }
        Ok(())
    }
}
