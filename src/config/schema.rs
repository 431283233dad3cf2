//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the ingestion service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, socket activation, admission).
    pub listener: ListenerConfig,

    /// Document store the payloads are published to.
    pub upstream: UpstreamConfig,

    /// Per-connection read/write limits.
    pub ingest: IngestConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:99"). Only used when no socket is inherited.
    pub bind_address: String,

    /// Accept a single pre-bound socket handed over by the supervisor.
    pub socket_activation: bool,

    /// Maximum concurrent connections. `0` disables the limit.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:99".to_string(),
            socket_activation: true,
            max_connections: 0,
        }
    }
}

/// Upstream document store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the haste-server instance (e.g., "https://ptero.co").
    pub base_url: String,

    /// Path documents are POSTed to, relative to `base_url`.
    pub documents_path: String,

    /// Upper bound for a single publish, in seconds.
    pub request_timeout_secs: u64,

    /// User-Agent header sent upstream.
    pub user_agent: String,

    /// Honor HTTP(S)_PROXY / NO_PROXY from the environment.
    pub system_proxy: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            documents_path: "/documents".to_string(),
            request_timeout_secs: 10,
            user_agent: concat!("tcpaste/", env!("CARGO_PKG_VERSION")).to_string(),
            system_proxy: true,
        }
    }
}

impl UpstreamConfig {
    /// Base URL without a trailing slash.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Limits applied while reading a connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum payload size in bytes. `0` disables the limit.
    pub max_payload_bytes: usize,

    /// Idle time after which the client is considered done sending.
    pub idle_timeout_ms: u64,

    /// Deadline for writing the response line back.
    pub write_timeout_ms: u64,

    /// Size of each individual read from the socket.
    pub read_chunk_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 128 * 1024,
            idle_timeout_ms: 2000,
            write_timeout_ms: 1000,
            read_chunk_bytes: 1024,
        }
    }
}

impl IngestConfig {
    /// The payload ceiling, or `None` for the unbounded variant.
    pub fn payload_limit(&self) -> Option<usize> {
        (self.max_payload_bytes > 0).then_some(self.max_payload_bytes)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9099".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for in-flight connections after the accept loop stops.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_secs: 5 }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:99");
        assert!(config.listener.socket_activation);
        assert_eq!(config.listener.max_connections, 0);
        assert_eq!(config.ingest.max_payload_bytes, 131_072);
        assert_eq!(config.ingest.idle_timeout(), Duration::from_secs(2));
        assert_eq!(config.ingest.write_timeout(), Duration::from_secs(1));
        assert_eq!(config.upstream.documents_path, "/documents");
        assert!(config.upstream.user_agent.starts_with("tcpaste/"));
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let mut ingest = IngestConfig::default();
        assert_eq!(ingest.payload_limit(), Some(131_072));
        ingest.max_payload_bytes = 0;
        assert_eq!(ingest.payload_limit(), None);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let upstream = UpstreamConfig {
            base_url: "https://example.test/".to_string(),
            ..UpstreamConfig::default()
        };
        assert_eq!(upstream.normalized_base_url(), "https://example.test");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [upstream]
            base_url = "https://example.test"

            [ingest]
            max_payload_bytes = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.upstream.base_url, "https://example.test");
        assert_eq!(config.ingest.max_payload_bytes, 10);
        assert_eq!(config.ingest.idle_timeout_ms, 2000);
        assert_eq!(config.listener.bind_address, "0.0.0.0:99");
    }
}
