//! Per-connection read state machine.
//!
//! ```text
//!            data, len <= limit
//!              ┌──────────┐
//!              ▼          │
//!          ┌─────────┐────┘
//!  entry ─▶│ Reading │── data, len > limit ──▶ Rejected
//!          └─────────┘── idle / EOF, data ───▶ Finished(payload)
//!               │    ── idle / EOF, none ───▶ Empty
//!               └────── read error ─────────▶ Errored
//! ```
//!
//! Clients are plain byte emitters (`nc host port < file`) that never half-close,
//! so silence for `idle_timeout` on a single read is the end-of-input signal.
//! The deadline is re-armed before every read.

use std::io;
use std::mem;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::config::IngestConfig;

/// Limits governing one ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestLimits {
    /// Silence on a single read that ends the stream.
    pub idle_timeout: Duration,
    /// Payload ceiling; `None` accepts any size.
    pub max_payload: Option<usize>,
    /// Buffer size for each read.
    pub read_chunk: usize,
}

impl From<&IngestConfig> for IngestLimits {
    fn from(config: &IngestConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            max_payload: config.payload_limit(),
            read_chunk: config.read_chunk_bytes.max(1),
        }
    }
}

/// Terminal state of a successful ingest run.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The client went quiet after sending this payload.
    Finished(Vec<u8>),
    /// The payload grew past `limit`; reading stopped at that point.
    Rejected { limit: usize },
    /// The client never sent anything.
    Empty,
}

impl IngestOutcome {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Finished(_) => "finished",
            IngestOutcome::Rejected { .. } => "rejected",
            IngestOutcome::Empty => "empty",
        }
    }
}

/// Transport failure while reading. Any partial payload is discarded.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read from connection after {received} bytes: {source}")]
    Read {
        received: usize,
        #[source]
        source: io::Error,
    },
}

enum Step {
    Reading,
    Done(IngestOutcome),
}

/// Accumulates one connection's payload.
#[derive(Debug)]
pub struct StreamIngest {
    limits: IngestLimits,
    payload: Vec<u8>,
}

impl StreamIngest {
    pub fn new(limits: IngestLimits) -> Self {
        Self {
            limits,
            payload: Vec::new(),
        }
    }

    /// Read from `reader` until a terminal state is reached.
    pub async fn run<R>(mut self, reader: &mut R) -> Result<IngestOutcome, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; self.limits.read_chunk];
        loop {
            match self.step(reader, &mut chunk).await? {
                Step::Reading => continue,
                Step::Done(outcome) => return Ok(outcome),
            }
        }
    }

    async fn step<R>(&mut self, reader: &mut R, chunk: &mut [u8]) -> Result<Step, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let read = match timeout(self.limits.idle_timeout, reader.read(chunk)).await {
            Ok(read) => read,
            Err(_) => return Ok(Step::Done(self.finish())),
        };

        match read {
            Ok(0) => Ok(Step::Done(self.finish())),
            Ok(n) => {
                self.payload.extend_from_slice(&chunk[..n]);
                match self.limits.max_payload {
                    Some(limit) if self.payload.len() > limit => {
                        Ok(Step::Done(IngestOutcome::Rejected { limit }))
                    }
                    _ => Ok(Step::Reading),
                }
            }
            Err(source) => Err(IngestError::Read {
                received: self.payload.len(),
                source,
            }),
        }
    }

    fn finish(&mut self) -> IngestOutcome {
        if self.payload.is_empty() {
            IngestOutcome::Empty
        } else {
            IngestOutcome::Finished(mem::take(&mut self.payload))
        }
    }
}
