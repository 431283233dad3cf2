//! Stream ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → stream.rs (read until idle timeout, EOF, limit or error)
//!     → [Finished] upstream publish
//!     → response.rs ("<base>/<key>\n" or the over-limit message)
//!     → single write back, then close
//! ```
//!
//! # Design Decisions
//! - No framing: end of input is inferred from silence
//! - The size ceiling is checked after every read and stops reading at once
//! - A transport error discards whatever was read so far

pub mod response;
pub mod stream;

pub use response::{compose, rejection_message};
pub use stream::{IngestError, IngestLimits, IngestOutcome, StreamIngest};
