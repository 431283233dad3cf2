//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one span per connection)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr (operator log)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Connection id and remote address flow through every event via the span
//! - Metrics are cheap and disabled unless an exporter is installed

pub mod logging;
pub mod metrics;
