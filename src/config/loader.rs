//! Configuration loading from disk and the environment.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Env {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load the startup snapshot: optional TOML file, then process environment,
/// then validation.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_config(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply the deployment environment on top of a parsed configuration.
///
/// `lookup` resolves a variable name; the process environment in
/// production, a map in tests.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("PROXY_LISTEN") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("ACTIVE_POOL") {
        config.upstream.active_pool = v;
    }
    if let Some(v) = lookup("BACKUP_POOL") {
        config.upstream.backup_pool = Some(v);
    }
    for backend in &mut config.backends {
        if let Some(v) = lookup(&upstream_var(&backend.name)) {
            backend.address = v;
        }
    }

    if let Some(v) = lookup("MAX_FAILS") {
        config.failover.max_fails = parse_env("MAX_FAILS", v)?;
    }
    if let Some(v) = lookup("FAIL_TIMEOUT") {
        config.failover.fail_timeout_secs = parse_env("FAIL_TIMEOUT", v)?;
    }
    if let Some(v) = lookup("RETRY_STATUSES") {
        config.failover.retry_statuses = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_env("RETRY_STATUSES", s.to_string()))
            .collect::<Result<_, _>>()?;
    }
    if let Some(v) = lookup("PROXY_CONNECT_TIMEOUT") {
        config.timeouts.connect_secs = parse_env("PROXY_CONNECT_TIMEOUT", v)?;
    }
    if let Some(v) = lookup("PROXY_READ_TIMEOUT") {
        config.timeouts.read_secs = parse_env("PROXY_READ_TIMEOUT", v)?;
    }

    if let Some(v) = lookup("SLACK_WEBHOOK_URL").filter(|v| !v.is_empty()) {
        config.alerts.webhook_url = Some(v);
        config.alerts.enabled = true;
    }
    if let Some(v) = lookup("ERROR_RATE_THRESHOLD") {
        config.alerts.error_rate_threshold = parse_env("ERROR_RATE_THRESHOLD", v)?;
    }
    if let Some(v) = lookup("WINDOW_SIZE") {
        config.alerts.window_size = parse_env("WINDOW_SIZE", v)?;
    }
    if let Some(v) = lookup("ALERT_COOLDOWN_SEC") {
        config.alerts.cooldown_secs = parse_env("ALERT_COOLDOWN_SEC", v)?;
    }
    if let Some(v) = lookup("MAINTENANCE_MODE") {
        config.alerts.maintenance_mode = parse_flag(&v);
    }

    if let Some(v) = lookup("LOG_LEVEL") {
        config.observability.log_level = v;
    }
    if let Some(v) = lookup("LOG_FORMAT") {
        config.observability.log_format = parse_env("LOG_FORMAT", v)?;
    }

    Ok(())
}

/// `blue` → `BLUE_UPSTREAM`, `canary-eu` → `CANARY_EU_UPSTREAM`.
fn upstream_var(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}_UPSTREAM", stem)
}

fn parse_env<T>(var: &str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        reason: e.to_string(),
        value,
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
