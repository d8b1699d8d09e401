//! Retry logic.
//!
//! # Responsibilities
//! - Describe why an upstream attempt failed
//! - Determine if the failed attempt may be replayed on the alternate backend
//!
//! # Design Decisions
//! - One retry at most, immediately, against the other backend
//! - A request that never left the proxy (connect failure) is always retryable
//! - Every method is replayed by default; `retry_non_idempotent = false`
//!   limits POST and friends to failures that happened before sending

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::health::Outcome;

/// Which bound a timed-out attempt hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    Connect,
    Read,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Connect => f.write_str("connect"),
            TimeoutPhase::Read => f.write_str("read"),
        }
    }
}

/// Why an upstream attempt (or a whole request) failed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connection to {backend} failed: {message}")]
    Connection {
        backend: String,
        /// The request was never written to the backend.
        before_send: bool,
        message: String,
    },

    #[error("{phase} timeout after {after:?} talking to {backend}")]
    Timeout {
        backend: String,
        phase: TimeoutPhase,
        after: Duration,
    },

    #[error("{backend} returned retry-trigger status {status}")]
    Status { backend: String, status: StatusCode },

    #[error("no healthy backend available after {attempts} attempt(s)")]
    AllBackendsDown { attempts: usize },
}

impl UpstreamError {
    /// TCP connect to the backend failed.
    pub fn connect_failed(backend: &str, err: &io::Error) -> Self {
        UpstreamError::Connection {
            backend: backend.to_string(),
            before_send: true,
            message: err.to_string(),
        }
    }

    /// The HTTP/1 connection could not be set up on an open socket.
    pub fn handshake_failed(backend: &str, err: &hyper::Error) -> Self {
        UpstreamError::Connection {
            backend: backend.to_string(),
            before_send: true,
            message: error_chain(err),
        }
    }

    /// The exchange broke after the request started going out.
    pub fn exchange_failed(backend: &str, err: &hyper::Error) -> Self {
        UpstreamError::Connection {
            backend: backend.to_string(),
            before_send: false,
            message: error_chain(err),
        }
    }

    /// What the health tracker should record. `None` for request-level errors.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            UpstreamError::Connection { .. } => Some(Outcome::ConnectionError),
            UpstreamError::Timeout { .. } => Some(Outcome::Timeout),
            UpstreamError::Status { status, .. } => Some(Outcome::UpstreamStatus(*status)),
            UpstreamError::AllBackendsDown { .. } => None,
        }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}

/// Decides whether a failed attempt may be replayed.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RetryPolicy {
    pub fn new(retry_non_idempotent: bool) -> Self {
        Self { retry_non_idempotent }
    }

    pub fn is_retryable(&self, method: &Method, err: &UpstreamError) -> bool {
        match err {
            UpstreamError::AllBackendsDown { .. } => false,
            UpstreamError::Connection { before_send: true, .. }
            | UpstreamError::Timeout { phase: TimeoutPhase::Connect, .. } => true,
            UpstreamError::Connection { .. }
            | UpstreamError::Timeout { .. }
            | UpstreamError::Status { .. } => {
                method.is_idempotent() || self.retry_non_idempotent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode) -> UpstreamError {
        UpstreamError::Status {
            backend: "blue".into(),
            status: code,
        }
    }

    #[test]
    fn idempotent_methods_retry_on_any_failure() {
        let policy = RetryPolicy::default();
        let read_timeout = UpstreamError::Timeout {
            backend: "blue".into(),
            phase: TimeoutPhase::Read,
            after: Duration::from_secs(3),
        };
        assert!(policy.is_retryable(&Method::GET, &status(StatusCode::SERVICE_UNAVAILABLE)));
        assert!(policy.is_retryable(&Method::PUT, &read_timeout));
        assert!(policy.is_retryable(&Method::DELETE, &status(StatusCode::BAD_GATEWAY)));
    }

    #[test]
    fn every_method_is_replayed_by_default() {
        let policy = RetryPolicy::default();
        let reset = UpstreamError::Connection {
            backend: "blue".into(),
            before_send: false,
            message: "connection reset".into(),
        };
        assert!(policy.is_retryable(&Method::POST, &status(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(policy.is_retryable(&Method::PATCH, &reset));
    }

    #[test]
    fn strict_policy_replays_post_only_before_send() {
        let policy = RetryPolicy::new(false);
        let refused = UpstreamError::Connection {
            backend: "blue".into(),
            before_send: true,
            message: "connection refused".into(),
        };
        let reset = UpstreamError::Connection {
            backend: "blue".into(),
            before_send: false,
            message: "connection reset".into(),
        };
        let connect_timeout = UpstreamError::Timeout {
            backend: "blue".into(),
            phase: TimeoutPhase::Connect,
            after: Duration::from_secs(2),
        };
        assert!(policy.is_retryable(&Method::POST, &refused));
        assert!(policy.is_retryable(&Method::POST, &connect_timeout));
        assert!(!policy.is_retryable(&Method::POST, &reset));
        assert!(!policy.is_retryable(&Method::POST, &status(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(policy.is_retryable(&Method::GET, &reset));
    }

    #[test]
    fn all_down_is_terminal() {
        let err = UpstreamError::AllBackendsDown { attempts: 2 };
        assert!(!RetryPolicy::new(true).is_retryable(&Method::GET, &err));
        assert_eq!(err.outcome(), None);
    }

    #[test]
    fn outcomes_map_to_health_reports() {
        assert_eq!(
            status(StatusCode::BAD_GATEWAY).outcome(),
            Some(Outcome::UpstreamStatus(StatusCode::BAD_GATEWAY))
        );
        let timeout = UpstreamError::Timeout {
            backend: "green".into(),
            phase: TimeoutPhase::Connect,
            after: Duration::from_secs(2),
        };
        assert_eq!(timeout.outcome(), Some(Outcome::Timeout));
        assert_eq!(timeout.to_string(), "connect timeout after 2s talking to green");
    }

    #[test]
    fn error_chain_walks_sources() {
        #[derive(Debug, Error)]
        #[error("wrapped")]
        struct Wrapped(#[source] io::Error);

        let wrapped = Wrapped(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        assert_eq!(error_chain(&wrapped), "wrapped: reset by peer");
    }

    #[test]
    fn connect_failures_happen_before_send() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        match UpstreamError::connect_failed("blue", &err) {
            UpstreamError::Connection { before_send, message, .. } => {
                assert!(before_send);
                assert_eq!(message, "refused");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
