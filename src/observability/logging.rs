//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once at startup
//! - Pick pretty or JSON output from configuration
//!
//! `RUST_LOG` wins over the configured level when it is set.

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use crate::config::{LogFormat, ObservabilityConfig};

/// Filter used when `RUST_LOG` is absent or unparseable.
pub fn default_filter(level: &str) -> String {
    format!("bluegreen_proxy={level},tower_http={level}")
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed, which only happens when
/// called twice in one process.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_crate_and_tower_http() {
        let filter = default_filter("debug");
        assert_eq!(filter, "bluegreen_proxy=debug,tower_http=debug");
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
