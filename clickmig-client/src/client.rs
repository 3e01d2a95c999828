use crate::{
    engine::{Column, Engine, Row},
    error::Result,
};

/// Cheaply clonable handle over an [`Engine`].
#[derive(Clone)]
pub struct Client {
    pub(crate) engine: Box<dyn Engine>,
}

impl Client {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    pub fn replicated(&self) -> bool {
        self.engine.replicated()
    }

    pub async fn execute(&self, statement: impl AsRef<str>) -> Result<()> {
        let statement = statement.as_ref();
        tracing::debug!(statement, "execute");

        self.engine.execute(statement).await
    }

    pub async fn select(&self, statement: impl AsRef<str>) -> Result<Vec<Row>> {
        self.engine.select(statement.as_ref()).await
    }

    pub async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        self.engine.insert(table, rows).await
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        self.engine.table_exists(name).await
    }

    pub async fn describe_table(&self, name: &str) -> Result<Vec<Column>> {
        self.engine.describe_table(name).await
    }
}
