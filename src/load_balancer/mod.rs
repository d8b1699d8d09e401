//! Upstream selection subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → pool.rs (current primary: configured primary if up, else backup)
//!     → backend.rs (identity + health tracker)
//!     → On failure: pool.rs (alternate backend, if up)
//! ```
//!
//! # Design Decisions
//! - Exactly two backends; ordering is preference, not rotation
//! - Down backends are excluded from selection
//! - Pool membership is fixed for the life of the process

pub mod backend;
pub mod pool;

pub use backend::{Backend, Role};
pub use pool::{PoolRegistry, RegistryError};
