//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the server from a validated configuration snapshot
//! - Bind the listener last, so traffic only arrives once everything is ready
//!
//! Any startup error is fatal; nothing is retried.

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to initialise server: {0}")]
    Server(#[from] ServerError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build, bind and serve until `shutdown` fires.
pub async fn start(config: ProxyConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    server
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)
}
