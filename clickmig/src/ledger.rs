use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, Utc};
use clickmig_client::{Client, Row};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;

pub const SCHEMA_MIGRATIONS_TABLE: &str = "schema_migrations";

const APPLIED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One apply or rollback event.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub version: u64,
    pub active: bool,
    pub applied_at: DateTime<Utc>,
}

/// Append-only history of migration events for one database.
///
/// Rows are never updated: a rollback appends an inactive record. The state of
/// a version is the one of its latest record. `applied_at` is stamped by the
/// server on insert, never by the runner.
#[derive(Clone)]
pub struct SchemaMigrationLedger {
    client: Client,
    table: String,
}

impl SchemaMigrationLedger {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            table: SCHEMA_MIGRATIONS_TABLE.to_owned(),
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = name.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn create_table_statement(&self) -> String {
        let engine = if self.client.replicated() {
            "ReplicatedReplacingMergeTree(applied_at)"
        } else {
            "ReplacingMergeTree(applied_at)"
        };

        format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
    version LowCardinality(String),
    active UInt8 NOT NULL DEFAULT 1,
    applied_at DateTime64(6, 'UTC') NOT NULL DEFAULT now64()
)
ENGINE = {engine}
PRIMARY KEY(version)
ORDER BY (version)"#,
            self.table
        )
    }

    /// Creates the ledger table unless it exists. Returns whether it was created.
    pub async fn ensure_table(&self) -> Result<bool> {
        if self.client.table_exists(&self.table).await? {
            return Ok(false);
        }

        self.client.execute(self.create_table_statement()).await?;

        Ok(true)
    }

    pub async fn record_applied(&self, version: u64) -> Result<()> {
        self.append(version, true).await
    }

    pub async fn record_rolled_back(&self, version: u64) -> Result<()> {
        self.append(version, false).await
    }

    async fn append(&self, version: u64, active: bool) -> Result<()> {
        let mut row = Row::new();
        row.insert("version".to_owned(), Value::String(version.to_string()));
        row.insert("active".to_owned(), Value::from(u8::from(active)));

        self.client.insert(&self.table, vec![row]).await?;

        Ok(())
    }

    /// Full history, oldest first.
    pub async fn records(&self) -> Result<Vec<LedgerRecord>> {
        let rows = self
            .client
            .select(format!(
                "SELECT version, active, applied_at FROM {} ORDER BY applied_at",
                self.table
            ))
            .await?;

        rows.iter().map(parse_record).collect()
    }

    /// Latest state of every version that has at least one record.
    pub async fn current_state(&self) -> Result<BTreeMap<u64, bool>> {
        let mut state = BTreeMap::new();

        for record in self.records().await? {
            state.insert(record.version, record.active);
        }

        Ok(state)
    }

    pub async fn currently_active_versions(&self) -> Result<BTreeSet<u64>> {
        Ok(self
            .current_state()
            .await?
            .into_iter()
            .filter_map(|(version, active)| active.then_some(version))
            .collect())
    }
}

fn parse_record(row: &Row) -> Result<LedgerRecord> {
    let version = match row.get("version") {
        Some(Value::String(v)) => v.parse::<u64>().ok(),
        Some(Value::Number(v)) => v.as_u64(),
        _ => None,
    }
    .ok_or_else(|| anyhow!("malformed ledger version in {row:?}"))?;

    let active = match row.get("active") {
        Some(Value::Bool(v)) => Some(*v),
        Some(Value::Number(v)) => v.as_u64().map(|v| v != 0),
        Some(Value::String(v)) => v.parse::<u64>().ok().map(|v| v != 0),
        _ => None,
    }
    .ok_or_else(|| anyhow!("malformed ledger active flag in {row:?}"))?;

    let applied_at = match row.get("applied_at") {
        Some(Value::String(v)) => NaiveDateTime::parse_from_str(v, APPLIED_AT_FORMAT)
            .ok()
            .map(|at| at.and_utc()),
        _ => None,
    }
    .ok_or_else(|| anyhow!("malformed ledger timestamp in {row:?}"))?;

    Ok(LedgerRecord {
        version,
        active,
        applied_at,
    })
}
