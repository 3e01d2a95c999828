use futures_util::FutureExt;
use std::{collections::HashMap, future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::sync::Mutex;

use crate::{
    config::LockConfig,
    error::{Error, Result},
    lease::{member, LeaseStore, WorkerRegistration},
};

/// Tracks background workers that write into migratable tables.
///
/// Registrations are shared through the coordination store; the nesting depth
/// of [`WorkerRegistry::register_running_worker`] scopes is process-local and
/// only decides which scope removes the entry on exit.
#[derive(Clone)]
pub struct WorkerRegistry {
    store: LeaseStore,
    config: Arc<LockConfig>,
    scopes: Arc<Mutex<HashMap<String, usize>>>,
}

impl WorkerRegistry {
    pub fn new(store: LeaseStore, config: LockConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            scopes: Arc::default(),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn store(&self) -> &LeaseStore {
        &self.store
    }

    pub async fn register(&self, owner_class: &str, worker_id: &str) -> Result<WorkerRegistration> {
        self.register_with_ttl(owner_class, worker_id, self.config.worker_ttl)
            .await
    }

    /// Registers with an explicit lifetime, capped at the configured ceiling.
    pub async fn register_with_ttl(
        &self,
        owner_class: &str,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<WorkerRegistration> {
        let ttl = ttl.min(self.config.max_worker_ttl);

        self.store
            .register_worker(&self.config.workers_key, owner_class, worker_id, ttl)
            .await
    }

    pub async fn unregister(&self, owner_class: &str, worker_id: &str) -> Result<bool> {
        self.store
            .unregister_worker(&self.config.workers_key, owner_class, worker_id)
            .await
    }

    pub async fn active_workers(&self) -> Result<Vec<String>> {
        self.store
            .list_active_workers(&self.config.workers_key, self.store.clock().now())
            .await
    }

    pub async fn any_active(&self) -> Result<bool> {
        Ok(!self.active_workers().await?.is_empty())
    }

    /// Keeps the worker registered while `body` runs.
    ///
    /// The outermost scope for a given worker removes the registration once
    /// `body` returns, whether it succeeded or not. Inner scopes only renew it.
    /// If the process dies the registration expires on its own.
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
        self.register_running_worker_with_ttl(owner_class, worker_id, self.config.worker_ttl, body)
            .await
    }

    pub async fn register_running_worker_with_ttl<F, Fut, T, E>(
        &self,
        owner_class: &str,
        worker_id: &str,
        ttl: Duration,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let key = member(owner_class, worker_id);

        self.enter(&key, owner_class, worker_id, ttl).await?;

        let outcome = AssertUnwindSafe(body()).catch_unwind().await;

        if let Err(e) = self.leave(&key, owner_class, worker_id).await {
            tracing::warn!("failed to unregister worker {key}, it will expire: {e}");
        }

        match outcome {
            Ok(res) => res,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn enter(&self, key: &str, owner_class: &str, worker_id: &str, ttl: Duration) -> Result<()> {
        let mut scopes = self.scopes.lock().await;

        self.register_with_ttl(owner_class, worker_id, ttl).await?;
        *scopes.entry(key.to_owned()).or_insert(0) += 1;

        Ok(())
    }

    async fn leave(&self, key: &str, owner_class: &str, worker_id: &str) -> Result<()> {
        let mut scopes = self.scopes.lock().await;

        let Some(depth) = scopes.get_mut(key) else {
            return Ok(());
        };

        *depth -= 1;

        if *depth > 0 {
            return Ok(());
        }

        scopes.remove(key);
        self.unregister(owner_class, worker_id).await?;

        Ok(())
    }
}
