//! TCP listener acquisition and accept with optional backpressure.
//!
//! # Responsibilities
//! - Adopt a single socket inherited from the supervisor, or bind the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections via semaphore when configured
//! - Surface accept errors to the caller without tearing the listener down

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::net::activation;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to the configured address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Failed to take over an inherited socket.
    #[error("failed to use inherited socket: {0}")]
    Inherit(#[source] io::Error),
    /// Failed to accept a connection.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),
}

/// Where the listening socket came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOrigin {
    /// Handed over by the supervisor.
    Inherited,
    /// Bound by this process.
    Bound,
}

/// A TCP listener that optionally limits concurrent connections.
///
/// With `max_connections > 0`, a semaphore enforces the limit: once it is
/// reached, `accept` waits until a slot is released.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections, if limited.
    connection_limit: Option<Arc<Semaphore>>,
    /// Configured maximum connections (0 = unbounded).
    max_connections: usize,
    origin: ListenerOrigin,
}

impl Listener {
    /// Use the single inherited socket if there is exactly one, otherwise bind.
    pub async fn acquire(config: &ListenerConfig) -> Result<Self, ListenerError> {
        if config.socket_activation {
            if let Some(listener) = select_inherited(activation::listeners()) {
                return Self::from_std(listener, config);
            }
        }
        Self::bind(config).await
    }

    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(config.bind_address.as_str())
            .await
            .map_err(|source| ListenerError::Bind {
                address: config.bind_address.clone(),
                source,
            })?;
        Ok(Self::new(listener, config, ListenerOrigin::Bound))
    }

    /// Wrap an already listening std socket.
    pub fn from_std(listener: std::net::TcpListener, config: &ListenerConfig) -> Result<Self, ListenerError> {
        listener.set_nonblocking(true).map_err(ListenerError::Inherit)?;
        let listener = TcpListener::from_std(listener).map_err(ListenerError::Inherit)?;
        Ok(Self::new(listener, config, ListenerOrigin::Inherited))
    }

    fn new(inner: TcpListener, config: &ListenerConfig, origin: ListenerOrigin) -> Self {
        let connection_limit =
            (config.max_connections > 0).then(|| Arc::new(Semaphore::new(config.max_connections)));

        match inner.local_addr() {
            Ok(address) => tracing::info!(
                address = %address,
                origin = ?origin,
                max_connections = config.max_connections,
                "Listener ready"
            ),
            Err(e) => tracing::warn!(error = %e, origin = ?origin, "Listener ready, address unknown"),
        }

        Self {
            inner,
            connection_limit,
            max_connections: config.max_connections,
            origin,
        }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<AcceptedConnection, ListenerError> {
        // Acquire permit first (backpressure)
        let permit = match &self.connection_limit {
            Some(limit) => Some(
                Arc::clone(limit)
                    .acquire_owned()
                    .await
                    .map_err(|e| ListenerError::Accept(io::Error::other(e)))?,
            ),
            None => None,
        };

        let (stream, peer_addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %peer_addr,
            available_permits = ?self.available_permits(),
            "Connection accepted"
        );

        Ok(AcceptedConnection {
            stream,
            peer_addr,
            permit: ConnectionPermit { _permit: permit },
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }

    /// Free connection slots, or `None` when unbounded.
    pub fn available_permits(&self) -> Option<usize> {
        self.connection_limit.as_ref().map(|limit| limit.available_permits())
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn origin(&self) -> ListenerOrigin {
        self.origin
    }
}

/// Pick the socket to serve from: only a lone inherited TCP listener qualifies.
fn select_inherited(mut inherited: Vec<Option<std::net::TcpListener>>) -> Option<std::net::TcpListener> {
    match inherited.len() {
        0 => None,
        1 => {
            let listener = inherited.pop().flatten();
            if listener.is_none() {
                tracing::warn!("Inherited descriptor is not a TCP listener, binding instead");
            }
            listener
        }
        count => {
            tracing::info!(count, "Expected exactly one inherited socket, binding instead");
            None
        }
    }
}

/// A freshly accepted connection.
#[derive(Debug)]
pub struct AcceptedConnection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub permit: ConnectionPermit,
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This keeps backpressure intact even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_config(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            socket_activation: false,
            max_connections,
        }
    }

    #[tokio::test]
    async fn binds_and_accepts() {
        let listener = Listener::acquire(&local_config(0)).await.unwrap();
        assert_eq!(listener.origin(), ListenerOrigin::Bound);
        assert_eq!(listener.available_permits(), None);

        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let accepted = listener.accept().await.unwrap();
        assert_eq!(accepted.peer_addr, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn bind_failure_names_address() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap().to_string();
        let err = Listener::bind(&ListenerConfig {
            bind_address: address.clone(),
            ..local_config(0)
        })
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(err.to_string().contains(&address));
    }

    #[tokio::test]
    async fn wraps_std_listener() {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let expected = std_listener.local_addr().unwrap();
        let listener = Listener::from_std(std_listener, &local_config(0)).unwrap();
        assert_eq!(listener.origin(), ListenerOrigin::Inherited);
        assert_eq!(listener.local_addr().unwrap(), expected);
    }

    #[tokio::test]
    async fn limit_blocks_until_permit_released() {
        let listener = Listener::acquire(&local_config(1)).await.unwrap();
        assert_eq!(listener.max_connections(), 1);
        let addr = listener.local_addr().unwrap();

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();

        let first = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), Some(0));

        let blocked = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(blocked.is_err(), "second accept should wait for a free slot");

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .expect("slot should be released")
            .unwrap();
        drop(second);
        assert_eq!(listener.available_permits(), Some(1));
    }

    fn std_listener() -> std::net::TcpListener {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn no_inherited_sockets_means_bind() {
        assert!(select_inherited(Vec::new()).is_none());
    }

    #[test]
    fn single_inherited_socket_is_used_verbatim() {
        let listener = std_listener();
        let expected = listener.local_addr().unwrap();
        let selected = select_inherited(vec![Some(listener)]).unwrap();
        assert_eq!(selected.local_addr().unwrap(), expected);
    }

    #[test]
    fn single_unusable_slot_means_bind() {
        assert!(select_inherited(vec![None]).is_none());
    }

    #[test]
    fn several_inherited_sockets_mean_bind() {
        let inherited = vec![Some(std_listener()), Some(std_listener())];
        assert!(select_inherited(inherited).is_none());
        assert!(select_inherited(vec![Some(std_listener()), None]).is_none());
    }

    #[tokio::test]
    async fn activation_without_inherited_sockets_binds() {
        // LISTEN_PID is never set to the test runner's pid.
        let config = ListenerConfig {
            socket_activation: true,
            ..local_config(0)
        };
        let listener = Listener::acquire(&config).await.unwrap();
        assert_eq!(listener.origin(), ListenerOrigin::Bound);
    }
}
