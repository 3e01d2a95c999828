//! Timings and keys of the migration lock protocol.
//!
//! Every process taking part in a deployment (migration runners and
//! background workers) must agree on the keys; the durations are tunables.

use std::time::Duration;

/// Key of the cluster-wide migration lease.
pub const MIGRATION_LEASE_KEY: &str = "click_house:migrations";

/// Sorted set holding the registrations of running workers.
pub const ACTIVE_WORKERS_KEY: &str = "click_house:workers:active_workers";

/// How long a migration lease survives a crashed holder.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60 * 60);

/// Lifetime of a worker registration when the worker does not renew it.
///
/// A worker that outlives its registration is treated as finished, so this is
/// also the safety margin between a slow worker and a migration.
pub const DEFAULT_WORKER_TTL: Duration = Duration::from_secs(30);

/// Delay between two checks for active workers while draining.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub lease_key: String,

    pub workers_key: String,

    pub lease_ttl: Duration,

    /// Default lifetime of a worker registration.
    pub worker_ttl: Duration,

    /// Upper bound applied to any requested registration lifetime.
    pub max_worker_ttl: Duration,

    pub drain_interval: Duration,

    /// Total time a migration waits for workers; `None` means `max_worker_ttl`.
    pub drain_timeout: Option<Duration>,
}

impl LockConfig {
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout.unwrap_or(self.max_worker_ttl)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_key: MIGRATION_LEASE_KEY.to_owned(),
            workers_key: ACTIVE_WORKERS_KEY.to_owned(),
            lease_ttl: DEFAULT_LEASE_TTL,
            worker_ttl: DEFAULT_WORKER_TTL,
            max_worker_ttl: DEFAULT_WORKER_TTL,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            drain_timeout: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct LockConfigBuilder {
    config: LockConfig,
}

impl LockConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix both keys, for deployments sharing one store.
    pub fn namespace(mut self, namespace: impl AsRef<str>) -> Self {
        let namespace = namespace.as_ref();
        self.config.lease_key = format!("{namespace}:{MIGRATION_LEASE_KEY}");
        self.config.workers_key = format!("{namespace}:{ACTIVE_WORKERS_KEY}");
        self
    }

    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.config.lease_ttl = ttl;
        self
    }

    /// Sets the default registration lifetime, raising the ceiling if needed.
    pub fn worker_ttl(mut self, ttl: Duration) -> Self {
        self.config.worker_ttl = ttl;
        self.config.max_worker_ttl = self.config.max_worker_ttl.max(ttl);
        self
    }

    pub fn max_worker_ttl(mut self, ttl: Duration) -> Self {
        self.config.max_worker_ttl = ttl;
        self.config.worker_ttl = self.config.worker_ttl.min(ttl);
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.config.drain_interval = interval;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> LockConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_timeout_follows_worker_ceiling() {
        let config = LockConfigBuilder::new()
            .max_worker_ttl(Duration::from_secs(90))
            .build();

        assert_eq!(config.drain_timeout(), Duration::from_secs(90));

        let config = LockConfigBuilder::new()
            .max_worker_ttl(Duration::from_secs(90))
            .drain_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn worker_ttl_never_exceeds_ceiling() {
        let config = LockConfigBuilder::new()
            .worker_ttl(Duration::from_secs(120))
            .max_worker_ttl(Duration::from_secs(60))
            .build();

        assert_eq!(config.worker_ttl, Duration::from_secs(60));
        assert_eq!(config.max_worker_ttl, Duration::from_secs(60));
    }

    #[test]
    fn namespace_prefixes_keys() {
        let config = LockConfigBuilder::new().namespace("staging").build();

        assert_eq!(config.lease_key, "staging:click_house:migrations");
        assert_eq!(
            config.workers_key,
            "staging:click_house:workers:active_workers"
        );
    }
}
