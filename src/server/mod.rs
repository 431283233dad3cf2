//! Connection server.
//!
//! # Responsibilities
//! - Run the accept loop until shutdown is requested
//! - Spawn one independent task per accepted connection
//! - Keep accept errors local: they are logged and the loop carries on
//!
//! # Design Decisions
//! - The loop never waits on a connection's processing
//! - Shutdown stops admission only; in-flight connections finish within their own deadlines
//! - `run` takes `&mut self`, so two accept loops can never share one server

pub mod handler;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;

use crate::lifecycle::ShutdownSignal;
use crate::net::{AcceptedConnection, ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::upstream::Publisher;

pub use handler::{handle_connection, Delivery, HandleError, HandlerContext, HandlerSettings};

/// Pause after a failed accept so persistent failures (e.g. EMFILE) do not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors that stop the accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Owns the listener and drives the accept loop.
pub struct ConnectionServer {
    listener: Listener,
    context: Arc<HandlerContext>,
    tracker: ConnectionTracker,
}

impl ConnectionServer {
    pub fn new(listener: Listener, publisher: Arc<dyn Publisher>, settings: HandlerSettings) -> Self {
        Self {
            listener,
            context: Arc::new(HandlerContext { publisher, settings }),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.listener.local_addr()
    }

    /// Handle on the in-flight connection count.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.listener.local_addr().map_err(ServerError::LocalAddr)?;
        tracing::info!(address = %addr, "Listening for incoming connections");

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let accepted = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok(connection) => self.dispatch(connection),
                Err(e) => {
                    metrics::record_accept_error();
                    tracing::warn!(error = %e, "Error while accepting connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!(
            in_flight = self.tracker.active_count(),
            "Stopped accepting connections"
        );
        Ok(())
    }

    fn dispatch(&self, connection: AcceptedConnection) {
        let AcceptedConnection {
            stream,
            peer_addr,
            permit,
        } = connection;

        let guard = self.tracker.track();
        let context = Arc::clone(&self.context);
        let span = tracing::info_span!("connection", id = %guard.id(), remote_addr = %peer_addr);

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;

                tracing::info!("New connection");
                match handle_connection(stream, &context).await {
                    Ok(delivery) => tracing::debug!(outcome = delivery.label(), "Connection handled"),
                    Err(e) => tracing::warn!(error = %e, "Error while handling connection"),
                }
                tracing::info!("Connection closed");
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::lifecycle::Shutdown;
    use crate::net::ListenerOrigin;
    use crate::upstream::{PublishError, RetrievalKey};
    use async_trait::async_trait;

    struct FixedKey;

    #[async_trait]
    impl Publisher for FixedKey {
        async fn publish(&self, _payload: Vec<u8>) -> Result<RetrievalKey, PublishError> {
            Ok(RetrievalKey::new("abcd").unwrap())
        }
    }

    async fn server() -> ConnectionServer {
        limited_server(0).await
    }

    async fn limited_server(max_connections: usize) -> ConnectionServer {
        let listener = Listener::bind(&ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            socket_activation: false,
            max_connections,
        })
        .await
        .unwrap();
        assert_eq!(listener.origin(), ListenerOrigin::Bound);

        let mut config = crate::config::ServiceConfig::default();
        config.upstream.base_url = "https://example.test".to_string();
        ConnectionServer::new(listener, Arc::new(FixedKey), HandlerSettings::from_config(&config))
    }

    #[tokio::test]
    async fn returns_immediately_when_already_shut_down() {
        let mut server = server().await;
        let shutdown = Shutdown::new();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), server.run(shutdown.subscribe()))
            .await
            .expect("run should return promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_pending_accept() {
        let mut server = server().await;
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();

        let running = tokio::spawn(async move { server.run(signal).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("run should observe shutdown")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_accept_waiting_for_a_slot() {
        let mut server = limited_server(1).await;
        let addr = server.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();

        let running = tokio::spawn(async move { server.run(signal).await });

        // The first client holds the only slot until its idle timeout.
        let _holder = tokio::net::TcpStream::connect(addr).await.unwrap();
        let _waiting = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("run should observe shutdown while waiting for a slot")
            .unwrap()
            .unwrap();
    }
}
