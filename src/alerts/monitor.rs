//! Traffic monitor.
//!
//! Consumes one [`TrafficEvent`] per client response and raises an
//! [`Alert`] when the serving pool flips or the 5xx rate over the last
//! `window_size` responses reaches the threshold. Each alert kind has its
//! own cooldown; maintenance mode silences everything.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::alerts::TrafficEvent;
use crate::config::AlertConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Failover,
    ErrorRate,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Failover => f.write_str("failover"),
            AlertKind::ErrorRate => f.write_str("error_rate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Failover {
        from: String,
        to: String,
        release: String,
        upstream: String,
    },
    ErrorRate {
        rate_pct: f64,
        window: usize,
        threshold: f64,
    },
}

impl Alert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Alert::Failover { .. } => AlertKind::Failover,
            Alert::ErrorRate { .. } => AlertKind::ErrorRate,
        }
    }

    /// Slack-flavoured markdown text, stamped with the time it was raised.
    pub fn message(&self, at: DateTime<Utc>) -> String {
        let time = at.to_rfc3339_opts(SecondsFormat::Micros, false);
        match self {
            Alert::Failover { from, to, release, upstream } => format!(
                ":rotating_light: *Failover detected*: traffic switched from *{}* to *{}*\nRelease: `{}`\nUpstream: `{}`\nTime: {}",
                from, to, release, upstream, time
            ),
            Alert::ErrorRate { rate_pct, window, threshold } => format!(
                ":warning: *High error rate detected*: {:.2}% 5xx over last {} requests (threshold {}%)\nTime: {}",
                rate_pct, window, threshold, time
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub error_rate_threshold: f64,
    pub window_size: usize,
    pub cooldown: Duration,
    pub maintenance_mode: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            error_rate_threshold: config.error_rate_threshold,
            window_size: config.window_size.max(1),
            cooldown: config.cooldown(),
            maintenance_mode: config.maintenance_mode,
        }
    }
}

#[derive(Debug)]
pub struct TrafficMonitor {
    settings: MonitorSettings,
    window: VecDeque<bool>,
    errors_in_window: usize,
    last_pool: Option<String>,
    last_failover_alert: Option<Instant>,
    last_error_rate_alert: Option<Instant>,
}

impl TrafficMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            window: VecDeque::with_capacity(settings.window_size),
            settings,
            errors_in_window: 0,
            last_pool: None,
            last_failover_alert: None,
            last_error_rate_alert: None,
        }
    }

    /// Pool seen on the most recent served response.
    pub fn last_pool(&self) -> Option<&str> {
        self.last_pool.as_deref()
    }

    /// 5xx percentage, once the window is full.
    pub fn error_rate(&self) -> Option<f64> {
        (self.window.len() >= self.settings.window_size)
            .then(|| self.errors_in_window as f64 * 100.0 / self.window.len() as f64)
    }

    pub fn observe(&mut self, event: &TrafficEvent, now: Instant) -> Vec<Alert> {
        let mut alerts = Vec::new();

        self.push_status(event.is_server_error());
        if let Some(rate_pct) = self.error_rate() {
            if rate_pct >= self.settings.error_rate_threshold {
                let alert = Alert::ErrorRate {
                    rate_pct,
                    window: self.window.len(),
                    threshold: self.settings.error_rate_threshold,
                };
                if self.allow(AlertKind::ErrorRate, now) {
                    alerts.push(alert);
                }
            }
        }

        if let Some(pool) = &event.pool {
            match self.last_pool.replace(pool.clone()) {
                Some(previous) if previous != *pool => {
                    tracing::info!(from = %previous, to = %pool, "Serving pool changed");
                    let alert = Alert::Failover {
                        from: previous,
                        to: pool.clone(),
                        release: event.release.clone().unwrap_or_else(|| "unknown".into()),
                        upstream: event.upstream.clone().unwrap_or_else(|| "unknown".into()),
                    };
                    if self.allow(AlertKind::Failover, now) {
                        alerts.push(alert);
                    }
                }
                _ => {}
            }
        }

        alerts
    }

    fn push_status(&mut self, is_error: bool) {
        if self.window.len() == self.settings.window_size {
            if let Some(true) = self.window.pop_front() {
                self.errors_in_window -= 1;
            }
        }
        self.window.push_back(is_error);
        if is_error {
            self.errors_in_window += 1;
        }
    }

    /// Cooldown and maintenance gate. Stamps the send time when allowed.
    fn allow(&mut self, kind: AlertKind, now: Instant) -> bool {
        if self.settings.maintenance_mode {
            tracing::info!(kind = %kind, "Maintenance mode on, alert suppressed");
            return false;
        }
        let last = match kind {
            AlertKind::Failover => &mut self.last_failover_alert,
            AlertKind::ErrorRate => &mut self.last_error_rate_alert,
        };
        if let Some(at) = *last {
            if now.saturating_duration_since(at) < self.settings.cooldown {
                tracing::debug!(kind = %kind, "Alert suppressed by cooldown");
                return false;
            }
        }
        *last = Some(now);
        true
    }
}
