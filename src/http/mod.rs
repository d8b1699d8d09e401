//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID + trace layers)
//!     → dispatch.rs (buffer body, pick backend, bounded attempt, one retry)
//!     → request.rs (rewrite URI, forwardable headers)
//!     → response.rs (pass-through or proxy-generated error)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::Dispatcher;
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
