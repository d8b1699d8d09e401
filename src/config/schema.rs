//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the failover proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Which pools act as primary and backup.
    pub upstream: UpstreamConfig,

    /// Backend pool definitions.
    pub backends: Vec<BackendConfig>,

    /// Passive health and retry settings.
    pub failover: FailoverConfig,

    /// Timeout configuration for upstream attempts.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Pool flip and error-rate alerting.
    pub alerts: AlertConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig::default(),
            backends: vec![
                BackendConfig {
                    name: "blue".to_string(),
                    address: "127.0.0.1:8081".to_string(),
                },
                BackendConfig {
                    name: "green".to_string(),
                    address: "127.0.0.1:8082".to_string(),
                },
            ],
            failover: FailoverConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            alerts: AlertConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Look up a backend definition by pool name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Name of the backup pool.
    ///
    /// Falls back to the only other configured backend when `backup_pool`
    /// is unset. Returns `None` if that choice is ambiguous.
    pub fn backup_pool_name(&self) -> Option<&str> {
        if let Some(name) = self.upstream.backup_pool.as_deref() {
            return Some(name);
        }
        let mut others = self
            .backends
            .iter()
            .filter(|b| b.name != self.upstream.active_pool);
        match (others.next(), others.next()) {
            (Some(only), None) => Some(only.name.as_str()),
            _ => None,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Active/backup pool selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Pool that receives traffic while healthy.
    pub active_pool: String,

    /// Pool used on failure. Defaults to the other backend.
    pub backup_pool: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            active_pool: "blue".to_string(),
            backup_pool: None,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Pool name (e.g., "blue").
    pub name: String,

    /// Backend address as `host:port` (e.g., "app_blue:3000").
    pub address: String,
}

/// Passive health checking and retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Consecutive failures before a backend is taken out of rotation.
    /// Zero disables the transition.
    pub max_fails: u32,

    /// How long a failed backend stays out of rotation, in seconds.
    pub fail_timeout_secs: u64,

    /// Upstream statuses that count as failures and trigger a retry.
    pub retry_statuses: Vec<u16>,

    /// Replay POST/PATCH and friends after the request was sent. When off,
    /// they are replayed only after connect failures.
    pub retry_non_idempotent: bool,
}

impl FailoverConfig {
    pub fn fail_timeout(&self) -> Duration {
        Duration::from_secs(self.fail_timeout_secs)
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_fails: 2,
            fail_timeout_secs: 5,
            retry_statuses: vec![500, 502, 503, 504],
            retry_non_idempotent: true,
        }
    }
}

/// Timeout configuration for upstream attempts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for response headers once connected, in seconds.
    pub read_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 2,
            read_secs: 3,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Traffic alerting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Run the traffic monitor.
    pub enabled: bool,

    /// Incoming webhook URL. Alerts are only logged when unset.
    pub webhook_url: Option<String>,

    /// 5xx percentage over the window that raises an alert.
    pub error_rate_threshold: f64,

    /// Number of recent responses in the error-rate window.
    pub window_size: usize,

    /// Minimum seconds between two alerts of the same kind.
    pub cooldown_secs: u64,

    /// Suppress all alerts (planned pool switches).
    pub maintenance_mode: bool,

    /// Response header carrying the serving pool name.
    pub pool_header: String,

    /// Response header carrying the release identifier.
    pub release_header: String,
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            error_rate_threshold: 2.0,
            window_size: 200,
            cooldown_secs: 300,
            maintenance_mode: false,
            pool_header: "x-app-pool".to_string(),
            release_header: "x-release-id".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
