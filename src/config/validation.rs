//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (active/backup pools name real backends)
//! - Validate value ranges (timeouts > 0, statuses in range)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::uri::Authority;
use axum::http::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// Upper bound for every `*_secs` duration: one day.
pub const MAX_DURATION_SECS: u64 = 86_400;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("backend name must not be empty")]
    EmptyBackendName,

    #[error("backend '{0}' is defined more than once")]
    DuplicateBackend(String),

    #[error("backend '{name}' has invalid address '{address}' (expected host:port)")]
    BackendAddress { name: String, address: String },

    #[error("pool '{0}' does not name a configured backend")]
    UnknownPool(String),

    #[error("backup_pool must be set when more than two backends are configured")]
    AmbiguousBackup,

    #[error("active and backup pool are both '{0}'")]
    SamePool(String),

    #[error("active and backup pool share address '{0}'")]
    SameAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("retry status {0} is outside 100..=599")]
    RetryStatus(u16),

    #[error("alerts.error_rate_threshold {0} must be within (0, 100]")]
    Threshold(f64),

    #[error("alerts.webhook_url '{0}' is not an http(s) URL")]
    WebhookUrl(String),

    #[error("'{0}' is not a valid header name")]
    HeaderName(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let mut seen = HashSet::new();
    for backend in &config.backends {
        if backend.name.is_empty() {
            errors.push(ValidationError::EmptyBackendName);
        } else if !seen.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        if !is_host_port(&backend.address) {
            errors.push(ValidationError::BackendAddress {
                name: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
    }

    let active = config.backend(&config.upstream.active_pool);
    if active.is_none() {
        errors.push(ValidationError::UnknownPool(config.upstream.active_pool.clone()));
    }

    match config.backup_pool_name() {
        None => errors.push(ValidationError::AmbiguousBackup),
        Some(backup_name) => match config.backend(backup_name) {
            None => errors.push(ValidationError::UnknownPool(backup_name.to_string())),
            Some(backup) => {
                if backup_name == config.upstream.active_pool {
                    errors.push(ValidationError::SamePool(backup_name.to_string()));
                } else if let Some(active) = active {
                    if active.address.eq_ignore_ascii_case(&backup.address) {
                        errors.push(ValidationError::SameAddress(backup.address.clone()));
                    }
                }
            }
        },
    }

    check_secs(&mut errors, "failover.fail_timeout_secs", config.failover.fail_timeout_secs);
    for &status in &config.failover.retry_statuses {
        if !(100..=599).contains(&status) {
            errors.push(ValidationError::RetryStatus(status));
        }
    }
    check_secs(&mut errors, "timeouts.connect_secs", config.timeouts.connect_secs);
    check_secs(&mut errors, "timeouts.read_secs", config.timeouts.read_secs);
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::Zero("limits.max_body_size"));
    }

    let alerts = &config.alerts;
    if alerts.window_size == 0 {
        errors.push(ValidationError::Zero("alerts.window_size"));
    }
    if !(alerts.error_rate_threshold > 0.0 && alerts.error_rate_threshold <= 100.0) {
        errors.push(ValidationError::Threshold(alerts.error_rate_threshold));
    }
    if let Some(raw) = &alerts.webhook_url {
        let valid = Url::parse(raw)
            .map(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::WebhookUrl(raw.clone()));
        }
    }
    for name in [&alerts.pool_header, &alerts.release_header] {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::HeaderName(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_secs(errors: &mut Vec<ValidationError>, field: &'static str, secs: u64) {
    if secs == 0 {
        errors.push(ValidationError::Zero(field));
    } else if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::TooLarge {
            field,
            max: MAX_DURATION_SECS,
        });
    }
}

fn is_host_port(address: &str) -> bool {
    match address.parse::<Authority>() {
        Ok(authority) => authority.port_u16().is_some() && !authority.host().is_empty(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let mut config = ProxyConfig::default();
        config.failover.fail_timeout_secs = u64::MAX;
        config.timeouts.connect_secs = MAX_DURATION_SECS + 1;
        config.timeouts.read_secs = MAX_DURATION_SECS;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::TooLarge {
                    field: "failover.fail_timeout_secs",
                    max: MAX_DURATION_SECS,
                },
                ValidationError::TooLarge {
                    field: "timeouts.connect_secs",
                    max: MAX_DURATION_SECS,
                },
            ]
        );
    }

    #[test]
    fn hostnames_are_accepted() {
        let mut config = ProxyConfig::default();
        config.backends[0].address = "app_blue:3000".into();
        config.backends[1].address = "app_green:3000".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-addr".into();
        config.backends[1].address = "no-port".into();
        config.timeouts.read_secs = 0;
        config.failover.retry_statuses.push(700);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::BindAddress("not-an-addr".into())));
        assert!(errors.contains(&ValidationError::BackendAddress {
            name: "green".into(),
            address: "no-port".into(),
        }));
        assert!(errors.contains(&ValidationError::Zero("timeouts.read_secs")));
        assert!(errors.contains(&ValidationError::RetryStatus(700)));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn rejects_unknown_and_identical_pools() {
        let mut config = ProxyConfig::default();
        config.upstream.active_pool = "purple".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownPool("purple".into())));

        let mut config = ProxyConfig::default();
        config.upstream.backup_pool = Some("blue".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::SamePool("blue".into())]);
    }

    #[test]
    fn rejects_shared_address() {
        let mut config = ProxyConfig::default();
        config.backends[1].address = config.backends[0].address.clone();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::SameAddress("127.0.0.1:8081".into())]
        );
    }

    #[test]
    fn requires_explicit_backup_with_three_backends() {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig {
            name: "canary".into(),
            address: "127.0.0.1:8083".into(),
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::AmbiguousBackup]);
    }

    #[test]
    fn checks_alert_settings() {
        let mut config = ProxyConfig::default();
        config.alerts.error_rate_threshold = 0.0;
        config.alerts.webhook_url = Some("ftp://example.com/hook".into());
        config.alerts.pool_header = "x app pool".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::HeaderName("x app pool".into())));
        assert!(errors.contains(&ValidationError::Threshold(0.0)));
        assert!(errors.contains(&ValidationError::WebhookUrl("ftp://example.com/hook".into())));
    }
}
