//! Timeout enforcement.
//!
//! An upstream attempt has two bounded phases. The connect bound covers
//! TCP establishment. The read bound starts once the connection is up and
//! covers writing the request and waiting for the response headers.

use std::future::Future;
use std::time::Duration;

use crate::config::TimeoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl AttemptTimeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            read: Duration::from_secs(config.read_secs),
        }
    }

    /// Worst case for one attempt, connect included.
    pub fn attempt_deadline(&self) -> Duration {
        self.connect.saturating_add(self.read)
    }

    /// Run the connect phase. `Err` carries the bound that hit.
    pub async fn connect_within<F: Future>(&self, fut: F) -> Result<F::Output, Duration> {
        within(self.connect, fut).await
    }

    /// Run the request/response-headers phase. `Err` carries the bound that hit.
    pub async fn read_within<F: Future>(&self, fut: F) -> Result<F::Output, Duration> {
        within(self.read, fut).await
    }
}

impl Default for AttemptTimeouts {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

async fn within<F: Future>(limit: Duration, fut: F) -> Result<F::Output, Duration> {
    tokio::time::timeout(limit, fut).await.map_err(|_| limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let t = AttemptTimeouts::default();
        assert_eq!(t.connect, Duration::from_secs(2));
        assert_eq!(t.read, Duration::from_secs(3));
        assert_eq!(t.attempt_deadline(), Duration::from_secs(5));
    }

    #[test]
    fn deadline_saturates() {
        let t = AttemptTimeouts {
            connect: Duration::MAX,
            read: Duration::from_secs(1),
        };
        assert_eq!(t.attempt_deadline(), Duration::MAX);
    }

    #[tokio::test]
    async fn fast_futures_pass_through() {
        let t = AttemptTimeouts::default();
        assert_eq!(t.connect_within(async { 7 }).await, Ok(7));
        assert_eq!(t.read_within(async { 8 }).await, Ok(8));
    }

    #[tokio::test]
    async fn each_phase_has_its_own_bound() {
        let t = AttemptTimeouts {
            connect: Duration::from_millis(10),
            read: Duration::from_millis(30),
        };
        let slow = || tokio::time::sleep(Duration::from_secs(5));
        assert_eq!(t.connect_within(slow()).await, Err(Duration::from_millis(10)));
        assert_eq!(t.read_within(slow()).await, Err(Duration::from_millis(30)));
    }
}
