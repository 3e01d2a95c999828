use async_trait::async_trait;
use dyn_clone::DynClone;
use std::time::Duration;

use crate::error::Result;

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "pg")]
mod pg;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "pg")]
pub use pg::*;

/// Primitives of the shared coordination store.
///
/// Keys hold a value with an expiry; sorted sets map members to `f64`
/// scores (epoch seconds). Every method must be atomic on the server side:
/// callers running in different processes rely on it for mutual exclusion.
#[async_trait]
pub trait Engine: DynClone + Send + Sync {
    /// Sets `key` to `value` unless an unexpired value is already present.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// True while `key` holds an unexpired value.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Deletes `key` only if it currently holds `value`.
    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool>;

    /// Adds `member`, or raises its score when `score` is greater.
    ///
    /// Older servers answer [`crate::StoreError::Unsupported`].
    async fn zadd_gt(&self, set: &str, score: f64, member: &str) -> Result<()>;

    /// Same outcome as [`Engine::zadd_gt`] through a path every server version
    /// implements.
    async fn zadd_max(&self, set: &str, score: f64, member: &str) -> Result<()>;

    /// Members whose score is strictly greater than `min_exclusive`.
    ///
    /// Older servers answer [`crate::StoreError::Unsupported`].
    async fn zrangebyscore(&self, set: &str, min_exclusive: f64) -> Result<Vec<String>>;

    async fn zrange_with_scores(&self, set: &str) -> Result<Vec<(String, f64)>>;

    async fn zrem(&self, set: &str, member: &str) -> Result<bool>;

    /// Removes members whose score is lower than or equal to `max_inclusive`.
    async fn zremrangebyscore(&self, set: &str, max_inclusive: f64) -> Result<u64>;
}

dyn_clone::clone_trait_object!(Engine);
