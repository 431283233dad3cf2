//! Upstream document store subsystem.
//!
//! # Data Flow
//! ```text
//! Finished payload (owned Vec<u8>)
//!     → Publisher::publish (haste.rs: HTTP POST to the documents endpoint)
//!     → RetrievalKey
//!     → ingest::response (compose "<base>/<key>\n")
//! ```
//!
//! # Design Decisions
//! - Publishing is a trait so the connection pipeline does not know about HTTP
//! - No retries: a failed publish is terminal for its connection
//! - Unexpected statuses keep a bounded slice of the body for diagnostics

pub mod error;
pub mod haste;

use std::fmt;

use async_trait::async_trait;

pub use error::PublishError;
pub use haste::HasteClient;

/// Opaque, non-empty key identifying a published document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetrievalKey(String);

impl RetrievalKey {
    /// Wrap a key returned by the store. Empty keys are rejected.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        (!key.is_empty()).then_some(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RetrievalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stores a payload and hands back the key it can be retrieved under.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: Vec<u8>) -> Result<RetrievalKey, PublishError>;
}
