//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (backend, outcome, request_id fields)
//!     → logging.rs (one subscriber, pretty or JSON to stdout)
//! ```
//!
//! The request ID set by the HTTP layer is attached to every attempt
//! log line, so one client request can be followed across a failover.

pub mod logging;

pub use logging::init_logging;
