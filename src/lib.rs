//! Raw TCP paste front-end.
//!
//! Accepts arbitrary byte streams (e.g. `cat file | nc host 99`), infers the end of
//! each stream from an idle read, publishes the payload to a haste-server and
//! answers with the document URL.

pub mod config;
pub mod ingest;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;
pub mod upstream;

pub use config::ServiceConfig;
pub use lifecycle::{Service, Shutdown};
pub use server::ConnectionServer;
