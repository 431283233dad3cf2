//! Publish error definitions.

use reqwest::StatusCode;
use thiserror::Error;

/// Upper bound on how much of an unexpected response body is kept.
pub const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

/// Errors that can occur while publishing a payload.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request could not be sent or the connection failed.
    #[error("failed to execute http request: {0}")]
    Request(#[source] reqwest::Error),

    /// The store answered with a status outside the accepted range.
    #[error("{}", status_message(*.status, *.expected, .body))]
    Status {
        status: StatusCode,
        expected: StatusCode,
        /// Up to [`MAX_ERROR_BODY_BYTES`] of the response body.
        body: Vec<u8>,
    },

    /// The response body was not the expected JSON document.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The store returned an empty retrieval key.
    #[error("upstream returned an empty key")]
    EmptyKey,

    /// The publish did not complete before its deadline.
    #[error("publish timed out after {0:?}")]
    Timeout(std::time::Duration),
}

fn status_message(status: StatusCode, expected: StatusCode, body: &[u8]) -> String {
    if body.is_empty() {
        format!(
            "expected {} status code, but got {}",
            expected.as_u16(),
            status.as_u16()
        )
    } else {
        format!(
            "expected {} status code, but got {} ({})",
            expected.as_u16(),
            status.as_u16(),
            String::from_utf8_lossy(body)
        )
    }
}

impl PublishError {
    /// Status code of a rejected publish, if the store answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PublishError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
