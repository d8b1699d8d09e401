//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with a catch-all proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Build the pool registry and dispatcher from configuration
//! - Start the traffic monitor when alerting is enabled
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::alerts::{
    self, AlertNotifier, MonitorSettings, NotifyError, TrafficEvent, TrafficMonitor, TrafficObserver,
};
use crate::config::ProxyConfig;
use crate::http::dispatch::Dispatcher;
use crate::http::request::request_id_layer;
use crate::load_balancer::{PoolRegistry, RegistryError};

/// Error type for server construction.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid alert header: {0}")]
    AlertHeader(#[from] axum::http::header::InvalidHeaderName),

    #[error(transparent)]
    Notifier(#[from] NotifyError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

struct MonitorParts {
    events: mpsc::Receiver<TrafficEvent>,
    monitor: TrafficMonitor,
    notifier: AlertNotifier,
}

/// HTTP server for the failover proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    registry: Arc<PoolRegistry>,
    monitor: Option<MonitorParts>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let registry = Arc::new(PoolRegistry::from_config(&config)?);
        let mut dispatcher = Dispatcher::new(&config, registry.clone());

        let monitor = if config.alerts.enabled {
            let (observer, events) = TrafficObserver::channel(&config.alerts)?;
            dispatcher = dispatcher.with_observer(observer);
            Some(MonitorParts {
                events,
                monitor: TrafficMonitor::new(MonitorSettings::from_config(&config.alerts)),
                notifier: AlertNotifier::new(config.alerts.webhook_url.as_deref())?,
            })
        } else {
            None
        };

        let state = AppState {
            dispatcher: Arc::new(dispatcher),
        };
        let router = Self::build_router(state);

        Ok(Self {
            router,
            config,
            registry,
            monitor,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(request_id_layer())
                    .layer(TraceLayer::new_for_http()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            primary = %self.registry.get_primary().name(),
            backup = %self.registry.get_backup().name(),
            "HTTP server starting"
        );

        if let Some(parts) = self.monitor {
            let monitor_shutdown = shutdown.resubscribe();
            tokio::spawn(alerts::run_monitor(
                parts.events,
                parts.monitor,
                parts.notifier,
                monitor_shutdown,
            ));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Shared registry, for inspecting backend health.
    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }
}

/// Catch-all handler: every method and path goes through the dispatcher.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.dispatcher.dispatch(request, Some(addr)).await
}
