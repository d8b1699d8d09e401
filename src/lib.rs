//! Blue/green failover reverse proxy library.

pub mod alerts;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use load_balancer::{Backend, PoolRegistry};
