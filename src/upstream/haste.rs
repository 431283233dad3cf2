//! haste-server client.
//!
//! # Responsibilities
//! - POST raw payload bytes to the documents endpoint
//! - Map unexpected statuses to [`PublishError::Status`] with a bounded body
//! - Decode the `{"key": "..."}` response into a [`RetrievalKey`]

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::upstream::error::{PublishError, MAX_ERROR_BODY_BYTES};
use crate::upstream::{Publisher, RetrievalKey};

/// Response body of a successful `POST /documents`.
#[derive(Debug, Deserialize)]
struct PasteResponse {
    key: String,
}

/// Publisher backed by a haste-server instance.
#[derive(Debug, Clone)]
pub struct HasteClient {
    client: Client,
    base_url: String,
    documents_url: String,
}

impl HasteClient {
    /// Create a new client from the upstream configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, PublishError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout());
        if !config.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(PublishError::Client)?;

        let base_url = config.normalized_base_url().to_string();
        let documents_url = format!(
            "{}/{}",
            base_url,
            config.documents_path.trim_start_matches('/')
        );

        Ok(Self {
            client,
            base_url,
            documents_url,
        })
    }

    /// Normalized base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL payloads are POSTed to.
    pub fn documents_url(&self) -> &str {
        &self.documents_url
    }
}

#[async_trait]
impl Publisher for HasteClient {
    async fn publish(&self, payload: Vec<u8>) -> Result<RetrievalKey, PublishError> {
        let response = self
            .client
            .post(&self.documents_url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .body(payload)
            .send()
            .await
            .map_err(PublishError::Request)?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(PublishError::Status {
                status,
                expected: StatusCode::OK,
                body: read_bounded_body(response, MAX_ERROR_BODY_BYTES).await,
            });
        }

        let bytes = response.bytes().await.map_err(PublishError::Request)?;
        let paste: PasteResponse = serde_json::from_slice(&bytes).map_err(PublishError::Decode)?;
        RetrievalKey::new(paste.key).ok_or(PublishError::EmptyKey)
    }
}

/// Read at most `limit` bytes of a response body. Read errors truncate silently.
async fn read_bounded_body(mut response: Response, limit: usize) -> Vec<u8> {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    body
}
