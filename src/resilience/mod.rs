//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (enforce connect/read bounds)
//!     → On failure: retries.rs (classify, check if retryable)
//!     → health tracker records the failure
//!     → dispatcher replays once on the alternate backend
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Retries are immediate, there is no backoff between the two attempts
//! - Backend eviction is the health tracker's job, not a circuit breaker's

pub mod retries;
pub mod timeouts;

pub use retries::{RetryPolicy, TimeoutPhase, UpstreamError};
pub use timeouts::AttemptTimeouts;
