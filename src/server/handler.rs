//! Per-connection pipeline: ingest → publish → respond → close.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::ServiceConfig;
use crate::ingest::{compose, rejection_message, IngestError, IngestLimits, IngestOutcome, StreamIngest};
use crate::observability::metrics;
use crate::upstream::{PublishError, Publisher, RetrievalKey};

/// Per-connection settings derived once from the service config.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Normalized base URL the retrieval key is appended to.
    pub base_url: String,
    pub limits: IngestLimits,
    pub write_timeout: Duration,
    pub publish_timeout: Duration,
}

impl HandlerSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            base_url: config.upstream.normalized_base_url().to_string(),
            limits: IngestLimits::from(&config.ingest),
            write_timeout: config.ingest.write_timeout(),
            publish_timeout: config.upstream.request_timeout(),
        }
    }
}

/// Everything a connection task needs, shared read-only between tasks.
pub struct HandlerContext {
    pub publisher: Arc<dyn Publisher>,
    pub settings: HandlerSettings,
}

/// Errors that end a connection without a response.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("failed to forward data to upstream: {0}")]
    Publish(#[from] PublishError),

    #[error("failed to write response: {0}")]
    Write(#[source] io::Error),

    #[error("response write timed out after {0:?}")]
    WriteTimeout(Duration),
}

/// How a connection ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The payload was stored and the URL line was written back.
    Published(RetrievalKey),
    /// The payload exceeded `limit` and the rejection message was written back.
    Rejected { limit: usize },
    /// The client sent nothing; nothing was written back.
    Empty,
}

impl Delivery {
    pub fn label(&self) -> &'static str {
        match self {
            Delivery::Published(_) => "published",
            Delivery::Rejected { .. } => "rejected",
            Delivery::Empty => "empty",
        }
    }
}

/// Drive one connection to completion.
///
/// The stream is consumed and therefore closed exactly once, on every path.
pub async fn handle_connection<S>(mut stream: S, ctx: &HandlerContext) -> Result<Delivery, HandleError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let settings = &ctx.settings;

    let outcome = match StreamIngest::new(settings.limits).run(&mut stream).await {
        Ok(outcome) => outcome,
        Err(e) => {
            metrics::record_outcome("errored");
            return Err(e.into());
        }
    };
    metrics::record_outcome(outcome.label());

    match outcome {
        IngestOutcome::Empty => {
            tracing::info!("No data received from client before connection timed out");
            Ok(Delivery::Empty)
        }
        IngestOutcome::Rejected { limit } => {
            tracing::info!(limit, "Payload exceeded size limit");
            write_response(&mut stream, &rejection_message(limit), settings.write_timeout).await?;
            Ok(Delivery::Rejected { limit })
        }
        IngestOutcome::Finished(payload) => {
            let size = payload.len();
            metrics::record_payload_size(size);

            let key = publish(ctx, payload).await?;
            tracing::info!(bytes = size, key = %key, "Payload published");

            let line = compose(&settings.base_url, key.as_str());
            write_response(&mut stream, &line, settings.write_timeout).await?;
            Ok(Delivery::Published(key))
        }
    }
}

async fn publish(ctx: &HandlerContext, payload: Vec<u8>) -> Result<RetrievalKey, PublishError> {
    let limit = ctx.settings.publish_timeout;
    let start = Instant::now();
    match timeout(limit, ctx.publisher.publish(payload)).await {
        Ok(Ok(key)) => {
            metrics::record_publish("ok", start);
            Ok(key)
        }
        Ok(Err(e)) => {
            metrics::record_publish("error", start);
            Err(e)
        }
        Err(_) => {
            metrics::record_publish("timeout", start);
            Err(PublishError::Timeout(limit))
        }
    }
}

/// Write `bytes` in one go and flush, bounded by `limit`.
async fn write_response<S>(stream: &mut S, bytes: &[u8], limit: Duration) -> Result<(), HandleError>
where
    S: AsyncWrite + Unpin,
{
    let write = async {
        stream.write_all(bytes).await?;
        stream.shutdown().await
    };
    match timeout(limit, write).await {
        Ok(result) => result.map_err(HandleError::Write),
        Err(_) => Err(HandleError::WriteTimeout(limit)),
    }
}
