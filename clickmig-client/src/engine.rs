use async_trait::async_trait;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "http")]
pub use http::*;
#[cfg(feature = "memory")]
pub use memory::*;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Connection to one logical database.
#[async_trait]
pub trait Engine: DynClone + Send + Sync {
    /// Whether tables created through this connection must use replicated
    /// storage engines.
    fn replicated(&self) -> bool;

    async fn execute(&self, statement: &str) -> Result<()>;

    async fn select(&self, statement: &str) -> Result<Vec<Row>>;

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()>;

    async fn table_exists(&self, name: &str) -> Result<bool>;

    async fn describe_table(&self, name: &str) -> Result<Vec<Column>>;
}

dyn_clone::clone_trait_object!(Engine);
