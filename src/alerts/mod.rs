//! Traffic alerting subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher finishes a request
//!     → TrafficObserver::publish (non-blocking, bounded channel)
//!     → run_monitor task
//!     → monitor.rs (pool flip / error-rate detection, cooldowns)
//!     → notifier.rs (log + optional webhook POST)
//! ```
//!
//! # Design Decisions
//! - Dispatch never waits on alerting; a full channel drops the event
//! - Pool identity comes from the backend's own response header, falling
//!   back to the backend name when the header is absent

pub mod monitor;
pub mod notifier;

use std::time::Instant;

use axum::http::header::{HeaderMap, HeaderName, InvalidHeaderName};
use axum::http::StatusCode;
use tokio::sync::{broadcast, mpsc};

use crate::config::AlertConfig;
use crate::load_balancer::Backend;

pub use monitor::{Alert, AlertKind, MonitorSettings, TrafficMonitor};
pub use notifier::{AlertNotifier, NotifyError};

const EVENT_CAPACITY: usize = 1024;

/// One client-facing response, as seen by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficEvent {
    /// Pool that served the request; `None` when no backend did.
    pub pool: Option<String>,
    pub release: Option<String>,
    pub upstream: Option<String>,
    pub status: u16,
}

impl TrafficEvent {
    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }
}

/// Sending half handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct TrafficObserver {
    tx: mpsc::Sender<TrafficEvent>,
    pool_header: HeaderName,
    release_header: HeaderName,
}

impl TrafficObserver {
    pub fn channel(
        config: &AlertConfig,
    ) -> Result<(Self, mpsc::Receiver<TrafficEvent>), InvalidHeaderName> {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let observer = Self {
            tx,
            pool_header: HeaderName::from_bytes(config.pool_header.as_bytes())?,
            release_header: HeaderName::from_bytes(config.release_header.as_bytes())?,
        };
        Ok((observer, rx))
    }

    /// A backend produced the client response.
    pub fn served(&self, backend: &Backend, status: StatusCode, headers: &HeaderMap) {
        let header = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.publish(TrafficEvent {
            pool: header(&self.pool_header).or_else(|| Some(backend.name().to_string())),
            release: header(&self.release_header),
            upstream: Some(backend.authority().to_string()),
            status: status.as_u16(),
        });
    }

    /// The proxy answered on its own (502, 413, ...).
    pub fn unserved(&self, status: StatusCode) {
        self.publish(TrafficEvent {
            pool: None,
            release: None,
            upstream: None,
            status: status.as_u16(),
        });
    }

    fn publish(&self, event: TrafficEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::debug!(error = %e, "Traffic event dropped");
        }
    }
}

/// Feed events through the monitor until the channel closes or shutdown.
pub async fn run_monitor(
    mut events: mpsc::Receiver<TrafficEvent>,
    mut monitor: TrafficMonitor,
    notifier: AlertNotifier,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(webhook = notifier.has_webhook(), "Traffic monitor starting");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                for alert in monitor.observe(&event, Instant::now()) {
                    let notifier = notifier.clone();
                    tokio::spawn(async move {
                        if let Err(e) = notifier.notify(&alert).await {
                            tracing::error!(kind = %alert.kind(), error = %e, "Failed to deliver alert");
                        }
                    });
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Traffic monitor received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
