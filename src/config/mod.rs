//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: ACTIVE_POOL, BLUE_UPSTREAM, ...)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → injected into the registry and dispatcher at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; switching the active pool is a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AlertConfig, BackendConfig, FailoverConfig, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ProxyConfig, TimeoutConfig, UpstreamConfig,
};
