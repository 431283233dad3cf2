//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tcpaste_connections_total` (counter): accepted connections
//! - `tcpaste_active_connections` (gauge): connections currently in flight
//! - `tcpaste_ingest_outcomes_total` (counter): by outcome (finished, rejected, empty, errored)
//! - `tcpaste_payload_bytes` (histogram): size of finished payloads
//! - `tcpaste_publish_total` (counter): by result (ok, error, timeout)
//! - `tcpaste_publish_duration_seconds` (histogram): upstream latency
//! - `tcpaste_accept_errors_total` (counter): non-fatal accept failures
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint and install it as the global recorder.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_opened() {
    counter!("tcpaste_connections_total").increment(1);
    gauge!("tcpaste_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("tcpaste_active_connections").decrement(1.0);
}

pub fn record_outcome(outcome: &'static str) {
    counter!("tcpaste_ingest_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn record_payload_size(bytes: usize) {
    histogram!("tcpaste_payload_bytes").record(bytes as f64);
}

/// Record one publish attempt that started at `start`.
pub fn record_publish(result: &'static str, start: Instant) {
    counter!("tcpaste_publish_total", "result" => result).increment(1);
    histogram!("tcpaste_publish_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_accept_error() {
    counter!("tcpaste_accept_errors_total").increment(1);
}
