use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use crate::{engine::Engine, error::Result};

/// Coordination store backed by two Postgres tables.
///
/// Leases live in `{prefix}_leases`, sorted sets in `{prefix}_sorted_sets`.
/// Expiry of leases is evaluated with the server's `now()`, so every process
/// shares one notion of time.
#[derive(Debug, Clone)]
pub struct PgEngine {
    pool: PgPool,
    prefix: Option<String>,
}

impl PgEngine {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            pool: pool.clone(),
            prefix: None,
        }
    }

    pub fn with_prefix(pool: &PgPool, prefix: impl Into<String>) -> Self {
        Self {
            pool: pool.clone(),
            prefix: Some(prefix.into()),
        }
    }

    pub fn table(&self, name: impl Into<String>) -> String {
        format!(
            "{}_{}",
            self.prefix.as_deref().unwrap_or("clickmig"),
            name.into()
        )
    }

    pub fn table_leases(&self) -> String {
        self.table("leases")
    }

    pub fn table_sorted_sets(&self) -> String {
        self.table("sorted_sets")
    }

    /// Creates the backing tables when they are missing.
    pub async fn init(&self) -> Result<()> {
        let table_leases = self.table_leases();
        let table_sorted_sets = self.table_sorted_sets();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table_leases} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table_sorted_sets} (
                name TEXT NOT NULL,
                member TEXT NOT NULL,
                score DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (name, member)
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Engine for PgEngine {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let table_leases = self.table_leases();

        let res = sqlx::query(&format!(
            r#"
            INSERT INTO {table_leases} (key, value, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            WHERE {table_leases}.expires_at <= now()
            "#
        ))
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let table_leases = self.table_leases();

        let exists = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM {table_leases} WHERE key = $1 AND expires_at > now())"
        ))
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool> {
        let table_leases = self.table_leases();

        let res = sqlx::query(&format!(
            "DELETE FROM {table_leases} WHERE key = $1 AND value = $2"
        ))
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn zadd_gt(&self, set: &str, score: f64, member: &str) -> Result<()> {
        let table_sorted_sets = self.table_sorted_sets();

        sqlx::query(&format!(
            r#"
            INSERT INTO {table_sorted_sets} (name, member, score) VALUES ($1, $2, $3)
            ON CONFLICT (name, member) DO UPDATE
            SET score = EXCLUDED.score
            WHERE {table_sorted_sets}.score < EXCLUDED.score
            "#
        ))
        .bind(set)
        .bind(member)
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn zadd_max(&self, set: &str, score: f64, member: &str) -> Result<()> {
        let table_sorted_sets = self.table_sorted_sets();

        sqlx::query(&format!(
            r#"
            INSERT INTO {table_sorted_sets} (name, member, score) VALUES ($1, $2, $3)
            ON CONFLICT (name, member) DO UPDATE
            SET score = GREATEST({table_sorted_sets}.score, EXCLUDED.score)
            "#
        ))
        .bind(set)
        .bind(member)
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn zrangebyscore(&self, set: &str, min_exclusive: f64) -> Result<Vec<String>> {
        let table_sorted_sets = self.table_sorted_sets();

        let members = sqlx::query_scalar::<_, String>(&format!(
            "SELECT member FROM {table_sorted_sets} WHERE name = $1 AND score > $2 ORDER BY member"
        ))
        .bind(set)
        .bind(min_exclusive)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn zrange_with_scores(&self, set: &str) -> Result<Vec<(String, f64)>> {
        let table_sorted_sets = self.table_sorted_sets();

        let members = sqlx::query_as::<_, (String, f64)>(&format!(
            "SELECT member, score FROM {table_sorted_sets} WHERE name = $1 ORDER BY score, member"
        ))
        .bind(set)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn zrem(&self, set: &str, member: &str) -> Result<bool> {
        let table_sorted_sets = self.table_sorted_sets();

        let res = sqlx::query(&format!(
            "DELETE FROM {table_sorted_sets} WHERE name = $1 AND member = $2"
        ))
        .bind(set)
        .bind(member)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn zremrangebyscore(&self, set: &str, max_inclusive: f64) -> Result<u64> {
        let table_sorted_sets = self.table_sorted_sets();

        let res = sqlx::query(&format!(
            "DELETE FROM {table_sorted_sets} WHERE name = $1 AND score <= $2"
        ))
        .bind(set)
        .bind(max_inclusive)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}
