//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Classify each upstream attempt
//! - Decide which outcomes count against a backend
//!
//! # Design Decisions
//! - Connection errors, timeouts and retry-trigger statuses are failures
//! - Any other status (4xx included) is a success and resets the count

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use axum::http::StatusCode;

/// Result of one proxy attempt, as seen by the health tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Timeout,
    ConnectionError,
    /// Backend answered with a retry-trigger status.
    UpstreamStatus(StatusCode),
}

impl Outcome {
    pub fn is_failure(self) -> bool {
        !matches!(self, Outcome::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Timeout => "timeout",
            Outcome::ConnectionError => "connection_error",
            Outcome::UpstreamStatus(_) => "upstream_status",
        }
    }
}

/// Maps response statuses to outcomes.
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    retry_statuses: BTreeSet<u16>,
}

impl StatusClassifier {
    pub fn new(retry_statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            retry_statuses: retry_statuses.into_iter().collect(),
        }
    }

    pub fn is_retry_trigger(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status.as_u16())
    }

    pub fn classify(&self, status: StatusCode) -> Outcome {
        if self.is_retry_trigger(status) {
            Outcome::UpstreamStatus(status)
        } else {
            Outcome::Success
        }
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new([500, 502, 503, 504])
    }
}

/// One attempt against one backend within a client request.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    pub backend: String,
    pub started: Instant,
    pub outcome: Outcome,
}

impl RequestAttempt {
    pub fn new(backend: impl Into<String>, started: Instant, outcome: Outcome) -> Self {
        Self {
            backend: backend.into(),
            started,
            outcome,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
