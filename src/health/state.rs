//! Backend health state machine.
//!
//! # States
//! - Up: backend receives traffic
//! - Down: backend excluded from selection until its cooldown elapses
//!
//! # State Transitions
//! ```text
//! Up → Down: consecutive failures >= max_fails
//! Down → Up: now >= down_until (failure count reset to zero)
//! ```
//!
//! # Design Decisions
//! - Recovery is time based; nothing probes the backend before it rejoins
//! - A success while Up clears the failure count at once
//! - Counters and deadline live behind one mutex so concurrent reports
//!   never lose an update

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::FailoverConfig;

/// Health of a single backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Up,
    Down,
}

/// Thresholds shared by every backend in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Consecutive failures that take a backend down. Zero never does.
    pub max_fails: u32,
    /// How long a backend stays down.
    pub fail_timeout: Duration,
}

impl HealthPolicy {
    pub fn from_config(config: &FailoverConfig) -> Self {
        Self {
            max_fails: config.max_fails,
            fail_timeout: config.fail_timeout(),
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_fails: 2,
            fail_timeout: Duration::from_secs(5),
        }
    }
}

/// What a report or poll did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// Threshold reached; out of rotation until the given instant.
    WentDown { until: Instant },
    /// Cooldown elapsed; back in rotation with a clean count.
    Recovered,
}

/// Point-in-time view of a tracker, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub consecutive_failures: u32,
    /// Time left in the cooldown, if down.
    pub down_for: Option<Duration>,
}

#[derive(Debug, Default)]
struct Counters {
    consecutive_failures: u32,
    down_until: Option<Instant>,
}

impl Counters {
    /// Apply cooldown expiry. Returns true if the backend just came back.
    fn expire(&mut self, now: Instant) -> bool {
        match self.down_until {
            Some(until) if now >= until => {
                self.down_until = None;
                self.consecutive_failures = 0;
                true
            }
            _ => false,
        }
    }

    fn state(&self) -> HealthState {
        if self.down_until.is_some() {
            HealthState::Down
        } else {
            HealthState::Up
        }
    }
}

/// Stand-in deadline when `now + fail_timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

fn cooldown_end(now: Instant, fail_timeout: Duration) -> Instant {
    now.checked_add(fail_timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Passive failure tracker for one backend.
#[derive(Debug)]
pub struct HealthTracker {
    policy: HealthPolicy,
    counters: Mutex<Counters>,
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn policy(&self) -> HealthPolicy {
        self.policy
    }

    /// Current state, applying cooldown expiry first.
    pub fn poll(&self, now: Instant) -> (HealthState, Transition) {
        let mut counters = self.lock();
        let transition = if counters.expire(now) {
            Transition::Recovered
        } else {
            Transition::Unchanged
        };
        (counters.state(), transition)
    }

    /// Count a retryable failure.
    ///
    /// While down the count still grows, but the deadline is not pushed out.
    pub fn record_failure(&self, now: Instant) -> Transition {
        let mut counters = self.lock();
        let recovered = counters.expire(now);

        counters.consecutive_failures = counters.consecutive_failures.saturating_add(1);

        if counters.down_until.is_none()
            && self.policy.max_fails > 0
            && counters.consecutive_failures >= self.policy.max_fails
        {
            let until = cooldown_end(now, self.policy.fail_timeout);
            counters.down_until = Some(until);
            return Transition::WentDown { until };
        }

        if recovered {
            Transition::Recovered
        } else {
            Transition::Unchanged
        }
    }

    /// Count a success. Clears the failure count; never ends a cooldown early.
    pub fn record_success(&self, now: Instant) -> Transition {
        let mut counters = self.lock();
        let recovered = counters.expire(now);
        counters.consecutive_failures = 0;

        if recovered {
            Transition::Recovered
        } else {
            Transition::Unchanged
        }
    }

    pub fn snapshot(&self, now: Instant) -> HealthSnapshot {
        let mut counters = self.lock();
        counters.expire(now);
        HealthSnapshot {
            state: counters.state(),
            consecutive_failures: counters.consecutive_failures,
            down_for: counters.down_until.map(|until| until.saturating_duration_since(now)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Counters are plain integers; a panic mid-update cannot leave them torn.
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
