//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend pool (blue or green)
//! - Own its passive health tracker
//! - Log health transitions with the pool name attached

use std::fmt;
use std::time::Instant;

use axum::http::uri::Authority;
use serde::Serialize;

use crate::health::{HealthPolicy, HealthSnapshot, HealthState, HealthTracker, Outcome, Transition};

/// Position of a backend in the pool pair. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Backup,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Backup => f.write_str("backup"),
        }
    }
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    name: String,
    authority: Authority,
    role: Role,
    health: HealthTracker,
}

impl Backend {
    pub fn new(name: impl Into<String>, authority: Authority, role: Role, policy: HealthPolicy) -> Self {
        Self {
            name: name.into(),
            authority,
            role,
            health: HealthTracker::new(policy),
        }
    }

    /// Pool name, e.g. "blue".
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `host:port` the proxy connects to.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Health as of `now`. Logs when a cooldown has just ended.
    pub fn health_at(&self, now: Instant) -> HealthState {
        let (state, transition) = self.health.poll(now);
        self.log_transition(transition);
        state
    }

    pub fn is_up(&self) -> bool {
        self.health_at(Instant::now()) == HealthState::Up
    }

    /// Feed one attempt outcome into the tracker.
    pub fn record(&self, outcome: Outcome, now: Instant) -> Transition {
        let transition = if outcome.is_failure() {
            let t = self.health.record_failure(now);
            tracing::debug!(
                backend = %self.name,
                outcome = outcome.as_str(),
                "Backend failure recorded"
            );
            t
        } else {
            self.health.record_success(now)
        };
        self.log_transition(transition);
        transition
    }

    pub fn snapshot(&self, now: Instant) -> HealthSnapshot {
        self.health.snapshot(now)
    }

    fn log_transition(&self, transition: Transition) {
        match transition {
            Transition::Unchanged => {}
            Transition::WentDown { until } => {
                tracing::warn!(
                    backend = %self.name,
                    address = %self.authority,
                    role = %self.role,
                    max_fails = self.health.policy().max_fails,
                    cooldown_secs = until.saturating_duration_since(Instant::now()).as_secs_f64(),
                    "Backend marked down"
                );
            }
            Transition::Recovered => {
                tracing::info!(
                    backend = %self.name,
                    address = %self.authority,
                    role = %self.role,
                    "Backend cooldown elapsed, back in rotation"
                );
            }
        }
    }
}
