use async_trait::async_trait;
use serde_json::Value;

use crate::{
    engine::{Column, Engine, Row},
    error::{ClientError, Result},
};

/// ClickHouse over its HTTP interface.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
    replicated: bool,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_owned(),
            database: database.into(),
            username: None,
            password: None,
            replicated: false,
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_replication(mut self, replicated: bool) -> Self {
        self.replicated = replicated;
        self
    }

    async fn post(&self, body: String) -> Result<String> {
        let mut req = self
            .client
            .post(format!("{}/?database={}", self.url, self.database))
            .body(body);

        if let Some(username) = &self.username {
            req = req.header("X-ClickHouse-User", username);
        }

        if let Some(password) = &self.password {
            req = req.header("X-ClickHouse-Key", password);
        }

        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text.trim().to_owned(),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl Engine for HttpEngine {
    fn replicated(&self) -> bool {
        self.replicated
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        self.post(statement.to_owned()).await?;

        Ok(())
    }

    async fn select(&self, statement: &str) -> Result<Vec<Row>> {
        let statement = statement.trim().trim_end_matches(';');
        let text = self.post(format!("{statement} FORMAT JSONEachRow")).await?;

        let mut rows = Vec::new();

        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            rows.push(serde_json::from_str::<Row>(line)?);
        }

        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let mut body = format!("INSERT INTO {table} FORMAT JSONEachRow\n");

        for row in rows {
            body.push_str(&serde_json::to_string(&row)?);
            body.push('\n');
        }

        self.post(body).await?;

        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let text = self.post(format!("EXISTS TABLE {name}")).await?;

        Ok(text.trim() == "1")
    }

    async fn describe_table(&self, name: &str) -> Result<Vec<Column>> {
        let rows = self.select(&format!("DESCRIBE TABLE {name}")).await?;

        let mut columns = Vec::new();

        for row in rows {
            columns.push(serde_json::from_value::<Column>(Value::Object(row))?);
        }

        Ok(columns)
    }
}
