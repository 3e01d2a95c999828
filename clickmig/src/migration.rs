use async_trait::async_trait;
use clickmig_client::Client;
use std::{
    collections::{BTreeSet, HashSet},
    fmt,
    future::Future,
};

use crate::error::{Error, Result};

/// Identifier of a configured logical database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatabaseId(String);

impl DatabaseId {
    pub const MAIN: &'static str = "main";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DatabaseId {
    fn default() -> Self {
        Self::new(Self::MAIN)
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatabaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DatabaseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One direction of a migration.
#[async_trait]
pub trait Operation: Send + Sync {
    async fn run(&self, client: Client) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Operation for F
where
    F: Fn(Client) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self, client: Client) -> anyhow::Result<()> {
        (self)(client).await
    }
}

/// Statements executed in order; the first failure stops the operation.
#[derive(Debug, Clone, Default)]
pub struct Sql(Vec<String>);

impl Sql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(mut self, statement: impl Into<String>) -> Self {
        self.0.push(statement.into());
        self
    }

    pub fn statements(&self) -> &[String] {
        &self.0
    }
}

pub fn sql(statement: impl Into<String>) -> Sql {
    Sql::new().statement(statement)
}

#[async_trait]
impl Operation for Sql {
    async fn run(&self, client: Client) -> anyhow::Result<()> {
        for statement in self.0.iter() {
            client.execute(statement).await?;
        }

        Ok(())
    }
}

/// A versioned, named schema change with an optional reversal.
pub struct Definition {
    version: u64,
    name: String,
    database: DatabaseId,
    targeted: bool,
    up: Box<dyn Operation>,
    down: Option<Box<dyn Operation>>,
}

impl Definition {
    pub fn new<O: Operation + 'static>(version: u64, name: impl Into<String>, up: O) -> Self {
        Self {
            version,
            name: name.into(),
            database: DatabaseId::default(),
            targeted: false,
            up: Box::new(up),
            down: None,
        }
    }

    pub fn down<O: Operation + 'static>(mut self, down: O) -> Self {
        self.down = Some(Box::new(down));
        self
    }

    /// Runs this migration against `database` instead of the one of its source.
    pub fn target(mut self, database: impl Into<DatabaseId>) -> Self {
        self.database = database.into();
        self.targeted = true;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &DatabaseId {
        &self.database
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    pub(crate) async fn run_up(&self, client: Client) -> anyhow::Result<()> {
        self.up.run(client).await
    }

    /// Returns false without doing anything when there is no reversal.
    pub(crate) async fn run_down(&self, client: Client) -> anyhow::Result<bool> {
        match &self.down {
            Some(down) => {
                down.run(client).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("database", self.database())
            .field("reversible", &self.is_reversible())
            .finish()
    }
}

/// Provides the definitions of one migration source, such as the migrations
/// of one database.
pub trait MigrationSource: Send + Sync {
    fn definitions(&self) -> Vec<Definition>;
}

impl<F> MigrationSource for F
where
    F: Fn() -> Vec<Definition> + Send + Sync,
{
    fn definitions(&self) -> Vec<Definition> {
        (self)()
    }
}

/// Validated definitions, sorted by version.
#[derive(Debug, Default)]
pub struct MigrationSet {
    migrations: Vec<Definition>,
}

impl MigrationSet {
    /// Fails on the first duplicated name or version.
    pub fn new(definitions: impl IntoIterator<Item = Definition>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut versions = HashSet::new();
        let mut migrations = Vec::new();

        for definition in definitions {
            if !names.insert(definition.name.to_owned()) {
                return Err(Error::DuplicateMigrationName(definition.name));
            }

            if !versions.insert(definition.version) {
                return Err(Error::DuplicateMigrationVersion(definition.version));
            }

            migrations.push(definition);
        }

        migrations.sort_by_key(|definition| definition.version);

        Ok(Self { migrations })
    }

    pub fn builder() -> MigrationSetBuilder {
        MigrationSetBuilder::default()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Definition> {
        self.migrations.iter()
    }

    pub fn get(&self, version: u64) -> Option<&Definition> {
        self.migrations
            .binary_search_by_key(&version, |definition| definition.version)
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    pub fn contains(&self, version: u64) -> bool {
        self.get(version).is_some()
    }

    pub fn versions(&self) -> Vec<u64> {
        self.migrations.iter().map(|d| d.version).collect()
    }

    pub fn databases(&self) -> BTreeSet<&DatabaseId> {
        self.migrations.iter().map(|d| d.database()).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Collects definitions from several sources keyed by database.
#[derive(Default)]
pub struct MigrationSetBuilder {
    definitions: Vec<Definition>,
}

impl MigrationSetBuilder {
    /// Definitions of `source` that do not name a target run against `database`.
    pub fn source(mut self, database: impl Into<DatabaseId>, source: impl MigrationSource) -> Self {
        let database = database.into();

        self.definitions
            .extend(source.definitions().into_iter().map(|mut definition| {
                if !definition.targeted {
                    definition.database = database.clone();
                }
                definition
            }));

        self
    }

    pub fn definition(mut self, definition: Definition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn build(self) -> Result<MigrationSet> {
        MigrationSet::new(self.definitions)
    }
}
