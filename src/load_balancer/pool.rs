//! Upstream pool registry.
//!
//! # Responsibilities
//! - Hold the primary/backup backend pair built from configuration
//! - Pick the preferred healthy backend for a request
//! - Route attempt outcomes to the right backend's tracker

use std::sync::Arc;
use std::time::Instant;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::health::{HealthPolicy, HealthState, Outcome, Transition};
use crate::load_balancer::backend::{Backend, Role};

/// Error type for registry construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("pool '{0}' is not configured")]
    UnknownPool(String),

    #[error("no backup pool could be determined")]
    NoBackup,

    #[error("backend '{name}' has invalid address '{address}'")]
    InvalidAddress { name: String, address: String },

    #[error("primary and backup must differ (both {0})")]
    NotDistinct(String),
}

/// The primary/backup pair for all routing decisions.
#[derive(Debug)]
pub struct PoolRegistry {
    primary: Arc<Backend>,
    backup: Arc<Backend>,
}

impl PoolRegistry {
    /// Pair two backends. Names and addresses must be distinct.
    pub fn new(primary: Backend, backup: Backend) -> Result<Self, RegistryError> {
        if primary.name() == backup.name() {
            return Err(RegistryError::NotDistinct(primary.name().to_string()));
        }
        if primary.authority() == backup.authority() {
            return Err(RegistryError::NotDistinct(primary.authority().to_string()));
        }
        Ok(Self {
            primary: Arc::new(primary),
            backup: Arc::new(backup),
        })
    }

    /// Build the pair named by `upstream.active_pool` / `upstream.backup_pool`.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, RegistryError> {
        let policy = HealthPolicy::from_config(&config.failover);
        let backup_name = config.backup_pool_name().ok_or(RegistryError::NoBackup)?;

        let primary = build_backend(config, &config.upstream.active_pool, Role::Primary, policy)?;
        let backup = build_backend(config, backup_name, Role::Backup, policy)?;

        tracing::info!(
            primary = %primary.name(),
            primary_address = %primary.authority(),
            backup = %backup.name(),
            backup_address = %backup.authority(),
            max_fails = policy.max_fails,
            fail_timeout_secs = policy.fail_timeout.as_secs(),
            "Upstream pool configured"
        );

        Self::new(primary, backup)
    }

    /// The configured primary, regardless of health.
    pub fn get_primary(&self) -> &Arc<Backend> {
        &self.primary
    }

    /// The configured backup, regardless of health.
    pub fn get_backup(&self) -> &Arc<Backend> {
        &self.backup
    }

    /// Both backends in preference order.
    pub fn all_backends(&self) -> [&Arc<Backend>; 2] {
        [&self.primary, &self.backup]
    }

    /// Backend that should take the next request: the configured primary if
    /// up, else the backup if up, else none.
    pub fn current_primary(&self, now: Instant) -> Option<Arc<Backend>> {
        self.all_backends()
            .into_iter()
            .find(|b| b.health_at(now) == HealthState::Up)
            .cloned()
    }

    /// The other backend of the pair, if it is up.
    pub fn alternate_of(&self, tried: &Backend, now: Instant) -> Option<Arc<Backend>> {
        let other = if self.is(&self.primary, tried) {
            &self.backup
        } else if self.is(&self.backup, tried) {
            &self.primary
        } else {
            return None;
        };
        (other.health_at(now) == HealthState::Up).then(|| other.clone())
    }

    /// Record an attempt outcome. Backends outside the pair are ignored.
    pub fn report_outcome(&self, backend: &Backend, outcome: Outcome) -> Transition {
        self.report_outcome_at(backend, outcome, Instant::now())
    }

    pub fn report_outcome_at(&self, backend: &Backend, outcome: Outcome, now: Instant) -> Transition {
        match self.all_backends().into_iter().find(|b| self.is(b, backend)) {
            Some(known) => known.record(outcome, now),
            None => {
                tracing::warn!(
                    backend = %backend.name(),
                    address = %backend.authority(),
                    "Outcome reported for unknown backend, ignoring"
                );
                Transition::Unchanged
            }
        }
    }

    fn is(&self, known: &Arc<Backend>, candidate: &Backend) -> bool {
        std::ptr::eq(Arc::as_ptr(known), candidate)
            || (known.name() == candidate.name() && known.authority() == candidate.authority())
    }
}

fn build_backend(
    config: &ProxyConfig,
    name: &str,
    role: Role,
    policy: HealthPolicy,
) -> Result<Backend, RegistryError> {
    let def = config
        .backend(name)
        .ok_or_else(|| RegistryError::UnknownPool(name.to_string()))?;
    let authority: Authority = def.address.parse().map_err(|_| RegistryError::InvalidAddress {
        name: def.name.clone(),
        address: def.address.clone(),
    })?;
    Ok(Backend::new(def.name.clone(), authority, role, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn registry() -> PoolRegistry {
        PoolRegistry::from_config(&ProxyConfig::default()).unwrap()
    }

    fn fail(reg: &PoolRegistry, backend: &Backend, now: Instant) {
        reg.report_outcome_at(backend, Outcome::UpstreamStatus(StatusCode::INTERNAL_SERVER_ERROR), now);
    }

    #[test]
    fn builds_from_config() {
        let reg = registry();
        assert_eq!(reg.get_primary().name(), "blue");
        assert_eq!(reg.get_primary().role(), Role::Primary);
        assert_eq!(reg.get_backup().name(), "green");
        assert_eq!(reg.get_backup().role(), Role::Backup);
    }

    #[test]
    fn active_pool_swaps_roles() {
        let mut config = ProxyConfig::default();
        config.upstream.active_pool = "green".into();
        let reg = PoolRegistry::from_config(&config).unwrap();
        assert_eq!(reg.get_primary().name(), "green");
        assert_eq!(reg.get_backup().name(), "blue");
    }

    #[test]
    fn rejects_bad_pairs() {
        let mut config = ProxyConfig::default();
        config.upstream.backup_pool = Some("blue".into());
        assert_eq!(
            PoolRegistry::from_config(&config).unwrap_err(),
            RegistryError::NotDistinct("blue".into())
        );

        let mut config = ProxyConfig::default();
        config.upstream.backup_pool = Some("purple".into());
        assert_eq!(
            PoolRegistry::from_config(&config).unwrap_err(),
            RegistryError::UnknownPool("purple".into())
        );
    }

    #[test]
    fn prefers_primary_then_backup_then_nothing() {
        let reg = registry();
        let now = Instant::now();
        let primary = reg.get_primary().clone();
        let backup = reg.get_backup().clone();

        assert_eq!(reg.current_primary(now).unwrap().name(), "blue");

        fail(&reg, &primary, now);
        fail(&reg, &primary, now);
        assert_eq!(reg.current_primary(now).unwrap().name(), "green");

        fail(&reg, &backup, now);
        fail(&reg, &backup, now);
        assert!(reg.current_primary(now).is_none());

        // both come back together after the cooldown
        let later = now + Duration::from_secs(5);
        assert_eq!(reg.current_primary(later).unwrap().name(), "blue");
    }

    #[test]
    fn alternate_is_the_other_healthy_backend() {
        let reg = registry();
        let now = Instant::now();
        let primary = reg.get_primary().clone();
        let backup = reg.get_backup().clone();

        assert_eq!(reg.alternate_of(&primary, now).unwrap().name(), "green");
        assert_eq!(reg.alternate_of(&backup, now).unwrap().name(), "blue");

        fail(&reg, &backup, now);
        fail(&reg, &backup, now);
        assert!(reg.alternate_of(&primary, now).is_none());
    }

    #[test]
    fn unknown_backend_reports_are_ignored() {
        let reg = registry();
        let stranger = Backend::new(
            "purple",
            "127.0.0.1:9999".parse().unwrap(),
            Role::Backup,
            HealthPolicy::default(),
        );
        let now = Instant::now();
        for _ in 0..5 {
            assert_eq!(
                reg.report_outcome_at(&stranger, Outcome::ConnectionError, now),
                Transition::Unchanged
            );
        }
        assert!(reg.alternate_of(&stranger, now).is_none());
        assert_eq!(reg.get_primary().snapshot(now).consecutive_failures, 0);
        assert_eq!(reg.get_backup().snapshot(now).consecutive_failures, 0);
    }

    #[test]
    fn reports_by_identity_match_copies() {
        let mut config = ProxyConfig::default();
        config.backends = vec![
            BackendConfig { name: "blue".into(), address: "app_blue:3000".into() },
            BackendConfig { name: "green".into(), address: "app_green:3000".into() },
        ];
        let reg = PoolRegistry::from_config(&config).unwrap();
        let lookalike = Backend::new(
            "blue",
            "app_blue:3000".parse().unwrap(),
            Role::Primary,
            HealthPolicy::default(),
        );
        let now = Instant::now();
        reg.report_outcome_at(&lookalike, Outcome::Timeout, now);
        assert_eq!(reg.get_primary().snapshot(now).consecutive_failures, 1);
    }
}
