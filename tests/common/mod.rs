//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use tcpaste::config::ServiceConfig;
use tcpaste::upstream::{PublishError, Publisher, RetrievalKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Responder = dyn Fn(&[u8]) -> (u16, String) + Send + Sync;

#[derive(Clone)]
struct StoreState {
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    respond: Arc<Responder>,
}

/// A programmable haste-server stand-in.
#[allow(dead_code)]
pub struct MockStore {
    pub addr: SocketAddr,
    pub received: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[allow(dead_code)]
impl MockStore {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

/// Start a mock store whose `POST /documents` answers with `respond(body)`.
#[allow(dead_code)]
pub async fn start_mock_store<F>(respond: F) -> MockStore
where
    F: Fn(&[u8]) -> (u16, String) + Send + Sync + 'static,
{
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = StoreState {
        received: received.clone(),
        respond: Arc::new(respond),
    };

    let app = Router::new()
        .route("/documents", post(documents))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockStore { addr, received }
}

async fn documents(State(state): State<StoreState>, body: Bytes) -> (StatusCode, String) {
    state.received.lock().unwrap().push(body.to_vec());
    let (status, body) = (state.respond)(&body[..]);
    (StatusCode::from_u16(status).unwrap(), body)
}

/// In-process publisher: records payloads and derives keys with `key_for`.
#[allow(dead_code)]
pub struct RecordingPublisher {
    pub calls: Mutex<Vec<Vec<u8>>>,
    key_for: Box<dyn Fn(&[u8]) -> Option<String> + Send + Sync>,
}

#[allow(dead_code)]
impl RecordingPublisher {
    pub fn new<F>(key_for: F) -> Arc<Self>
    where
        F: Fn(&[u8]) -> Option<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            key_for: Box::new(key_for),
        })
    }

    /// Key is the payload itself, except `fail` which fails the publish.
    pub fn echo() -> Arc<Self> {
        Self::new(|payload| {
            (payload != b"fail").then(|| String::from_utf8_lossy(payload).into_owned())
        })
    }

    pub fn calls(&self) -> Vec<Vec<u8>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, payload: Vec<u8>) -> Result<RetrievalKey, PublishError> {
        self.calls.lock().unwrap().push(payload.clone());
        match (self.key_for)(&payload) {
            Some(key) => RetrievalKey::new(key).ok_or(PublishError::EmptyKey),
            None => Err(PublishError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                expected: reqwest::StatusCode::OK,
                body: b"mock failure".to_vec(),
            }),
        }
    }
}

/// Config bound to an ephemeral local port with a short idle timeout.
#[allow(dead_code)]
pub fn test_config(base_url: &str, max_payload_bytes: usize) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.socket_activation = false;
    config.upstream.base_url = base_url.to_string();
    config.upstream.request_timeout_secs = 5;
    config.upstream.system_proxy = false;
    config.ingest.max_payload_bytes = max_payload_bytes;
    config.ingest.idle_timeout_ms = 200;
    config.ingest.write_timeout_ms = 1000;
    config
}

/// Behave like `nc`: send the payload, keep the socket open, read until the server closes.
#[allow(dead_code)]
pub async fn send_payload(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    if !payload.is_empty() {
        stream.write_all(payload).await.unwrap();
    }
    read_response(&mut stream).await
}

/// Send the payload, then half-close the write side.
#[allow(dead_code)]
pub async fn send_and_close_write(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
    read_response(&mut stream).await
}

async fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("server should close the connection")
        .unwrap();
    response
}
