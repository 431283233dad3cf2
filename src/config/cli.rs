//! Command-line flags layered over the config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::ServiceConfig;
use crate::config::validation::validate_config;

#[derive(Debug, Parser)]
#[command(name = "tcpaste")]
#[command(version, about = "Forward raw TCP streams to a haste-server", long_about = None)]
pub struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen address, used when no socket is inherited
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// haste-server URL
    #[arg(long, visible_alias = "hastebin", value_name = "URL")]
    pub upstream_url: Option<String>,

    /// Maximum size per paste in bytes (0 disables the limit)
    #[arg(long, value_name = "BYTES")]
    pub limit: Option<usize>,

    /// Idle time in milliseconds after which a client is considered done
    #[arg(long, value_name = "MS")]
    pub idle_timeout_ms: Option<u64>,

    /// Maximum concurrent connections (0 disables the limit)
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    pub metrics_address: Option<String>,
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then flags, then validation.
    pub fn into_config(self) -> Result<ServiceConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ServiceConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(self, config: &mut ServiceConfig) {
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(url) = self.upstream_url {
            config.upstream.base_url = url;
        }
        if let Some(limit) = self.limit {
            config.ingest.max_payload_bytes = limit;
        }
        if let Some(idle) = self.idle_timeout_ms {
            config.ingest.idle_timeout_ms = idle;
        }
        if let Some(max) = self.max_connections {
            config.listener.max_connections = max;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(addr) = self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "tcpaste",
            "--listen",
            "127.0.0.1:4000",
            "--hastebin",
            "https://example.test",
            "--limit",
            "10",
            "--metrics-address",
            "127.0.0.1:9100",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:4000");
        assert_eq!(config.upstream.base_url, "https://example.test");
        assert_eq!(config.ingest.max_payload_bytes, 10);
        assert!(config.observability.metrics_enabled);
        assert_eq!(config.observability.metrics_address, "127.0.0.1:9100");
    }

    #[test]
    fn missing_upstream_fails_validation() {
        let cli = Cli::parse_from(["tcpaste"]);
        assert!(matches!(cli.into_config(), Err(ConfigError::Validation(_))));
    }
}
