//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the upstream URL and value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream.base_url must be set")]
    MissingBaseUrl,

    #[error("upstream.base_url '{url}' is invalid: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("listener.bind_address must be set")]
    MissingBindAddress,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let base_url = config.upstream.normalized_base_url();
    if base_url.is_empty() {
        errors.push(ValidationError::MissingBaseUrl);
    } else {
        match Url::parse(base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::MissingBindAddress);
    }

    let ranges = [
        ("upstream.request_timeout_secs", config.upstream.request_timeout_secs),
        ("ingest.idle_timeout_ms", config.ingest.idle_timeout_ms),
        ("ingest.write_timeout_ms", config.ingest.write_timeout_ms),
        ("ingest.read_chunk_bytes", config.ingest.read_chunk_bytes as u64),
    ];
    for (field, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
