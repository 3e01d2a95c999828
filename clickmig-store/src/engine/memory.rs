use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    clock::{expires_at, Clock, SystemClock},
    engine::Engine,
    error::{Result, StoreError},
};

#[derive(Debug, Default)]
struct Data {
    keys: HashMap<String, (String, DateTime<Utc>)>,
    sets: HashMap<String, HashMap<String, f64>>,
}

/// Process-local engine. Shared between clones, so several lock or registry
/// instances built from the same `MemoryEngine` behave like separate
/// processes talking to one server.
#[derive(Clone)]
pub struct MemoryEngine {
    data: Arc<RwLock<Data>>,
    clock: Box<dyn Clock>,
    legacy: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self {
            data: Arc::default(),
            clock: Box::new(clock),
            legacy: false,
        }
    }

    /// Behaves like a server predating `ZADD GT` and score range reads.
    pub fn legacy(mut self) -> Self {
        self.legacy = true;
        self
    }

    pub fn score(&self, set: &str, member: &str) -> Option<f64> {
        self.data
            .read()
            .sets
            .get(set)
            .and_then(|members| members.get(member))
            .copied()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut data = self.data.write();

        if let Some((_, expires)) = data.keys.get(key) {
            if *expires > now {
                return Ok(false);
            }
        }

        data.keys
            .insert(key.to_owned(), (value.to_owned(), expires_at(now, ttl)));

        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();

        Ok(self
            .data
            .read()
            .keys
            .get(key)
            .map(|(_, expires)| *expires > now)
            .unwrap_or(false))
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool> {
        let mut data = self.data.write();

        match data.keys.get(key) {
            Some((current, _)) if current == value => {
                data.keys.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn zadd_gt(&self, set: &str, score: f64, member: &str) -> Result<()> {
        if self.legacy {
            return Err(StoreError::Unsupported("ZADD GT"));
        }

        self.zadd_max(set, score, member).await
    }

    async fn zadd_max(&self, set: &str, score: f64, member: &str) -> Result<()> {
        let mut data = self.data.write();
        let current = data
            .sets
            .entry(set.to_owned())
            .or_default()
            .entry(member.to_owned())
            .or_insert(score);

        if score > *current {
            *current = score;
        }

        Ok(())
    }

    async fn zrangebyscore(&self, set: &str, min_exclusive: f64) -> Result<Vec<String>> {
        if self.legacy {
            return Err(StoreError::Unsupported("ZRANGEBYSCORE"));
        }

        let mut members = self
            .zrange_with_scores(set)
            .await?
            .into_iter()
            .filter(|(_, score)| *score > min_exclusive)
            .map(|(member, _)| member)
            .collect::<Vec<_>>();

        members.sort();

        Ok(members)
    }

    async fn zrange_with_scores(&self, set: &str) -> Result<Vec<(String, f64)>> {
        let mut members = self
            .data
            .read()
            .sets
            .get(set)
            .map(|members| {
                members
                    .iter()
                    .map(|(member, score)| (member.to_owned(), *score))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        Ok(members)
    }

    async fn zrem(&self, set: &str, member: &str) -> Result<bool> {
        Ok(self
            .data
            .write()
            .sets
            .get_mut(set)
            .map(|members| members.remove(member).is_some())
            .unwrap_or(false))
    }

    async fn zremrangebyscore(&self, set: &str, max_inclusive: f64) -> Result<u64> {
        let mut data = self.data.write();
        let Some(members) = data.sets.get_mut(set) else {
            return Ok(0);
        };

        let before = members.len();
        members.retain(|_, score| *score > max_inclusive);

        Ok((before - members.len()) as u64)
    }
}
