//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Passive health checks (passive.rs):
//!     Proxy attempt finishes
//!     → Classify outcome (success / timeout / connection error / status)
//!     → Report to the backend's tracker
//!
//! State machine (state.rs):
//!     Up → Down after max_fails consecutive failures
//!     Down → Up once fail_timeout has elapsed
//! ```
//!
//! # Design Decisions
//! - No active probing; real traffic is the only signal
//! - Health state is per-backend, not per-pool

pub mod passive;
pub mod state;

pub use passive::{Outcome, RequestAttempt, StatusClassifier};
pub use state::{HealthPolicy, HealthSnapshot, HealthState, HealthTracker, Transition};
