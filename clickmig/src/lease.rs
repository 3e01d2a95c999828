use chrono::{DateTime, Utc};
use clickmig_store::{epoch_seconds, expires_at, Clock, Engine, SystemClock};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use uuid::Uuid;

use crate::error::Result;

/// A held lease. Only the holder of the token can release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub token: String,
}

/// A worker entry as stored in the registry set.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRegistration {
    pub owner_class: String,
    pub worker_id: String,
    pub expires_at: DateTime<Utc>,
}

impl WorkerRegistration {
    pub fn member(&self) -> String {
        member(&self.owner_class, &self.worker_id)
    }
}

pub(crate) fn member(owner_class: &str, worker_id: &str) -> String {
    format!("{owner_class}:{worker_id}")
}

#[derive(Debug)]
struct Capabilities {
    zadd_gt: AtomicBool,
    range_by_score: AtomicBool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            zadd_gt: AtomicBool::new(true),
            range_by_score: AtomicBool::new(true),
        }
    }
}

/// Leases and worker registrations on top of a coordination store [`Engine`].
///
/// Optional server primitives are probed on first use; once the server
/// answers `Unsupported` the compatible path is used for the lifetime of this
/// store and its clones.
#[derive(Clone)]
pub struct LeaseStore {
    engine: Box<dyn Engine>,
    clock: Box<dyn Clock>,
    capabilities: Arc<Capabilities>,
}

impl LeaseStore {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self::with_clock(engine, SystemClock)
    }

    pub fn with_clock<E: Engine + 'static, C: Clock + 'static>(engine: E, clock: C) -> Self {
        Self {
            engine: Box::new(engine),
            clock: Box::new(clock),
            capabilities: Arc::default(),
        }
    }

    pub fn clock(&self) -> &(dyn Clock + 'static) {
        self.clock.as_ref()
    }

    pub async fn try_acquire_lease(&self, key: &str, timeout: Duration) -> Result<Option<Lease>> {
        let token = Uuid::new_v4().to_string();

        if !self.engine.set_nx(key, &token, timeout).await? {
            return Ok(None);
        }

        Ok(Some(Lease {
            key: key.to_owned(),
            token,
        }))
    }

    /// Releases `lease` if it is still ours. Returns false when it had already
    /// expired or been taken over.
    pub async fn release_lease(&self, lease: &Lease) -> Result<bool> {
        Ok(self.engine.del_if_eq(&lease.key, &lease.token).await?)
    }

    pub async fn lease_exists(&self, key: &str) -> Result<bool> {
        Ok(self.engine.exists(key).await?)
    }

    /// Registers a worker until `now + ttl`. An existing registration with a
    /// later expiry is left untouched.
    pub async fn register_worker(
        &self,
        set: &str,
        owner_class: &str,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<WorkerRegistration> {
        let registration = WorkerRegistration {
            owner_class: owner_class.to_owned(),
            worker_id: worker_id.to_owned(),
            expires_at: expires_at(self.clock.now(), ttl),
        };

        let score = epoch_seconds(registration.expires_at);
        let member = registration.member();

        if self.capabilities.zadd_gt.load(Ordering::Relaxed) {
            match self.engine.zadd_gt(set, score, &member).await {
                Ok(()) => return Ok(registration),
                Err(e) if e.is_unsupported() => {
                    tracing::debug!("{e}, falling back to monotonic zadd");
                    self.capabilities.zadd_gt.store(false, Ordering::Relaxed);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.engine.zadd_max(set, score, &member).await?;

        Ok(registration)
    }

    pub async fn unregister_worker(
        &self,
        set: &str,
        owner_class: &str,
        worker_id: &str,
    ) -> Result<bool> {
        Ok(self
            .engine
            .zrem(set, &member(owner_class, worker_id))
            .await?)
    }

    /// Members whose registration is still valid at `now`.
    pub async fn list_active_workers(&self, set: &str, now: DateTime<Utc>) -> Result<Vec<String>> {
        let now = epoch_seconds(now);

        let pruned = self.engine.zremrangebyscore(set, now).await?;
        if pruned > 0 {
            tracing::debug!("pruned {pruned} expired worker registrations from {set}");
        }

        if self.capabilities.range_by_score.load(Ordering::Relaxed) {
            match self.engine.zrangebyscore(set, now).await {
                Ok(members) => return Ok(members),
                Err(e) if e.is_unsupported() => {
                    tracing::debug!("{e}, falling back to a filtered range read");
                    self.capabilities
                        .range_by_score
                        .store(false, Ordering::Relaxed);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut members = self
            .engine
            .zrange_with_scores(set)
            .await?
            .into_iter()
            .filter(|(_, score)| *score > now)
            .map(|(member, _)| member)
            .collect::<Vec<_>>();

        members.sort();

        Ok(members)
    }

    pub async fn any_active(&self, set: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(!self.list_active_workers(set, now).await?.is_empty())
    }
}
