use clickmig_store::expires_at;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tracing::{debug, error, info};

use crate::{
    config::LockConfig,
    error::{Error, LockError, Result},
    lease::{Lease, LeaseStore},
    worker::WorkerRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    LeasePending,
    LeaseHeld,
    Draining,
    Running,
    Released,
    Aborted,
}

/// Gives one process at a time exclusive write access to the schema.
///
/// `execute` takes the migration lease without waiting, then waits a bounded
/// time for registered workers to finish before running the work. The lease
/// is released on every path once acquired.
pub struct ExclusiveLock {
    workers: WorkerRegistry,
    state: Arc<RwLock<LockState>>,
}

/// Clones share the worker registry but track their own state.
impl Clone for ExclusiveLock {
    fn clone(&self) -> Self {
        Self::with_registry(self.workers.clone())
    }
}

impl ExclusiveLock {
    pub fn new(store: LeaseStore, config: LockConfig) -> Self {
        Self::with_registry(WorkerRegistry::new(store, config))
    }

    pub fn with_registry(workers: WorkerRegistry) -> Self {
        Self {
            workers,
            state: Arc::new(RwLock::new(LockState::Idle)),
        }
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    /// State reached by the latest `execute` on this instance.
    pub fn state(&self) -> LockState {
        *self.state.read()
    }

    /// True while some process holds the migration lease. Workers check it to
    /// defer their work instead of delaying a migration.
    pub async fn pause_workers(&self) -> Result<bool> {
        self.workers
            .store()
            .lease_exists(&self.workers.config().lease_key)
            .await
    }

    pub async fn register_running_worker<F, Fut, T, E>(
        &self,
        owner_class: &str,
        worker_id: &str,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        self.workers
            .register_running_worker(owner_class, worker_id, body)
            .await
    }

    pub async fn execute<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = self.workers.config();
        let store = self.workers.store();

        self.transition(LockState::LeasePending);

        let lease = match store
            .try_acquire_lease(&config.lease_key, config.lease_ttl)
            .await
        {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                self.transition(LockState::Aborted);
                return Err(LockError::LeaseHeld {
                    key: config.lease_key.to_owned(),
                }
                .into());
            }
            Err(e) => {
                self.transition(LockState::Aborted);
                return Err(e);
            }
        };

        self.transition(LockState::LeaseHeld);
        self.transition(LockState::Draining);

        if let Err(e) = self.drain().await {
            self.transition(LockState::Aborted);
            self.release(&lease).await;
            return Err(e);
        }

        self.transition(LockState::Running);

        let outcome = AssertUnwindSafe(work()).catch_unwind().await;

        self.release(&lease).await;
        self.transition(LockState::Released);

        match outcome {
            Ok(res) => res,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn drain(&self) -> Result<()> {
        let config = self.workers.config();
        let clock = self.workers.store().clock();
        let timeout = config.drain_timeout();
        let started = clock.now();
        let deadline = expires_at(started, timeout);

        loop {
            let workers = self.workers.active_workers().await?;

            if workers.is_empty() {
                return Ok(());
            }

            let now = clock.now();

            if now >= deadline {
                return Err(LockError::WorkersActive {
                    waited: (now - started).to_std().unwrap_or(timeout),
                    workers,
                }
                .into());
            }

            info!(
                "waiting for {} active worker(s) before migrating: {}",
                workers.len(),
                workers.join(", ")
            );

            let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            clock.sleep(config.drain_interval.min(remaining)).await;
        }
    }

    async fn release(&self, lease: &Lease) {
        match self.workers.store().release_lease(lease).await {
            Ok(true) => {}
            Ok(false) => debug!("migration lease {} had already expired", lease.key),
            Err(e) => error!("failed to release migration lease {}: {e}", lease.key),
        }
    }

    fn transition(&self, next: LockState) {
        let mut state = self.state.write();
        debug!("migration lock {:?} -> {:?}", *state, next);
        *state = next;
    }
}
