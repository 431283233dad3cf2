//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor-provided socket (activation.rs) or fresh bind
//!     → listener.rs (accept, optional connection limit)
//!     → connection.rs (id, lifetime tracking)
//!     → Hand off to the per-connection handler
//! ```
//!
//! # Design Decisions
//! - Exactly one inherited socket is used verbatim; any other count falls back to bind
//! - Unbounded by default; a semaphore bounds admission when configured
//! - Each connection tracked for graceful shutdown

pub mod activation;
pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{AcceptedConnection, ConnectionPermit, Listener, ListenerError, ListenerOrigin};
