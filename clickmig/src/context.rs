use std::{
    collections::{BTreeMap, BTreeSet},
    time::Instant,
};
use tracing::{error, info, warn};

use crate::{
    database::Databases,
    error::{Error, Result},
    ledger::{SchemaMigrationLedger, SCHEMA_MIGRATIONS_TABLE},
    lock::ExclusiveLock,
    migration::{DatabaseId, Definition, MigrationSet},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: u64,
    /// `None` when the ledger knows a version that has no definition anymore.
    pub name: Option<String>,
    pub database: DatabaseId,
    pub active: bool,
}

type ActiveVersions = BTreeMap<DatabaseId, BTreeSet<u64>>;

/// Converges the ledgers of the configured databases to a requested version.
///
/// Migrations run one at a time in version order, each inside
/// [`ExclusiveLock::execute`]. Only versions confirmed active by a ledger are
/// skipped, so a run interrupted by a crash or an error resumes where it
/// stopped. The ledger is read again once the lock is held, and a migration
/// another runner completed in the meantime is skipped.
pub struct MigrationContext {
    set: MigrationSet,
    databases: Databases,
    lock: ExclusiveLock,
    ledger_table: String,
}

impl MigrationContext {
    pub fn new(set: MigrationSet, databases: Databases, lock: ExclusiveLock) -> Self {
        Self {
            set,
            databases,
            lock,
            ledger_table: SCHEMA_MIGRATIONS_TABLE.to_owned(),
        }
    }

    pub fn ledger_table(mut self, name: impl Into<String>) -> Self {
        self.ledger_table = name.into();
        self
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.set
    }

    pub fn lock(&self) -> &ExclusiveLock {
        &self.lock
    }

    pub fn ledger(&self, database: &DatabaseId) -> Result<SchemaMigrationLedger> {
        let client = self.databases.get(database)?.clone();

        Ok(SchemaMigrationLedger::new(client).table(self.ledger_table.to_owned()))
    }

    /// Applies every pending migration up to `target` (all of them when
    /// `None`) and returns the applied versions.
    pub async fn migrate(&self, target: Option<u64>) -> Result<Vec<u64>> {
        if let Some(version) = target {
            if !self.set.contains(version) {
                return Err(Error::UnknownMigrationVersion(version));
            }
        }

        let active = self.active_versions().await?;

        let pending = self
            .set
            .iter()
            .filter(|definition| target.map_or(true, |version| definition.version() <= version))
            .filter(|definition| !is_active(&active, definition))
            .collect::<Vec<_>>();

        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(Vec::new());
        }

        let mut applied = Vec::new();

        for definition in pending {
            if self.run(definition, Direction::Up).await? {
                applied.push(definition.version());
            }
        }

        Ok(applied)
    }

    /// Rolls back active migrations above `target`, or the latest `step` of
    /// them (one by default). `target` wins when both are given; `Some(0)`
    /// rolls back everything.
    pub async fn rollback(&self, target: Option<u64>, step: Option<usize>) -> Result<Vec<u64>> {
        if let Some(version) = target {
            if version != 0 && !self.set.contains(version) {
                return Err(Error::UnknownMigrationVersion(version));
            }
        }

        let active = self.active_versions().await?;

        let mut candidates = self
            .set
            .iter()
            .rev()
            .filter(|definition| is_active(&active, definition))
            .collect::<Vec<_>>();

        match target {
            Some(version) => candidates.retain(|definition| definition.version() > version),
            None => candidates.truncate(step.unwrap_or(1)),
        }

        if candidates.is_empty() {
            info!("nothing to roll back");
            return Ok(Vec::new());
        }

        let mut reverted = Vec::new();

        for definition in candidates {
            if self.run(definition, Direction::Down).await? {
                reverted.push(definition.version());
            }
        }

        Ok(reverted)
    }

    /// Applies one migration. Returns false if it was already active.
    pub async fn up(&self, version: u64) -> Result<bool> {
        self.run_single(version, Direction::Up).await
    }

    /// Rolls back one migration. Returns false if it was not active.
    pub async fn down(&self, version: u64) -> Result<bool> {
        self.run_single(version, Direction::Down).await
    }

    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let active = self.active_versions().await?;

        let mut status = self
            .set
            .iter()
            .map(|definition| MigrationStatus {
                version: definition.version(),
                name: Some(definition.name().to_owned()),
                database: definition.database().clone(),
                active: is_active(&active, definition),
            })
            .collect::<Vec<_>>();

        status.extend(
            self.orphans(&active)
                .into_iter()
                .map(|(database, version)| MigrationStatus {
                    version,
                    name: None,
                    database,
                    active: true,
                }),
        );

        status.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.database.cmp(&b.database))
        });

        Ok(status)
    }

    pub async fn pending(&self) -> Result<Vec<u64>> {
        let active = self.active_versions().await?;

        Ok(self
            .set
            .iter()
            .filter(|definition| !is_active(&active, definition))
            .map(|definition| definition.version())
            .collect())
    }

    /// Highest active version across all databases.
    pub async fn current_version(&self) -> Result<Option<u64>> {
        let active = self.active_versions().await?;

        Ok(active.values().flatten().max().copied())
    }

    async fn run_single(&self, version: u64, direction: Direction) -> Result<bool> {
        let definition = self
            .set
            .get(version)
            .ok_or(Error::UnknownMigrationVersion(version))?;

        self.ledger(definition.database())?.ensure_table().await?;
        self.run(definition, direction).await
    }

    /// Runs one migration under the lock. Returns false when the ledger, read
    /// once the lock is held, shows it already in the requested state.
    async fn run(&self, definition: &Definition, direction: Direction) -> Result<bool> {
        let client = self.databases.get(definition.database())?.clone();
        let ledger = self.ledger(definition.database())?;
        let version = definition.version();
        let name = definition.name();

        self.lock
            .execute(|| async move {
                let active = ledger
                    .currently_active_versions()
                    .await?
                    .contains(&version);

                if active == (direction == Direction::Up) {
                    info!(
                        "{version} {name} is already {}",
                        if active { "applied" } else { "rolled back" }
                    );
                    return Ok(false);
                }

                let started = Instant::now();

                match direction {
                    Direction::Up => {
                        info!("== {version} {name}: migrating ({})", definition.database());

                        definition
                            .run_up(client)
                            .await
                            .map_err(|e| failed(definition, e))?;

                        ledger.record_applied(version).await?;

                        info!(
                            "== {version} {name}: migrated ({:.4}s)",
                            started.elapsed().as_secs_f64()
                        );
                    }
                    Direction::Down => {
                        info!("== {version} {name}: reverting ({})", definition.database());

                        let reverted = definition
                            .run_down(client)
                            .await
                            .map_err(|e| failed(definition, e))?;

                        if !reverted {
                            info!("-- {version} {name} has no down step, recording the rollback only");
                        }

                        ledger.record_rolled_back(version).await?;

                        info!(
                            "== {version} {name}: reverted ({:.4}s)",
                            started.elapsed().as_secs_f64()
                        );
                    }
                }

                Ok(true)
            })
            .await
    }

    async fn active_versions(&self) -> Result<ActiveVersions> {
        let mut active = ActiveVersions::new();

        for database in self.set.databases() {
            let ledger = self.ledger(database)?;
            ledger.ensure_table().await?;
            active.insert(database.clone(), ledger.currently_active_versions().await?);
        }

        for (database, version) in self.orphans(&active) {
            warn!("version {version} is active on `{database}` but has no definition");
        }

        Ok(active)
    }

    fn orphans(&self, active: &ActiveVersions) -> Vec<(DatabaseId, u64)> {
        active
            .iter()
            .flat_map(|(database, versions)| {
                versions
                    .iter()
                    .filter(move |version| {
                        self.set
                            .get(**version)
                            .map_or(true, |definition| definition.database() != database)
                    })
                    .map(move |version| (database.clone(), *version))
            })
            .collect()
    }
}

fn is_active(active: &ActiveVersions, definition: &Definition) -> bool {
    active
        .get(definition.database())
        .is_some_and(|versions| versions.contains(&definition.version()))
}

fn failed(definition: &Definition, source: anyhow::Error) -> Error {
    error!(
        "{} {} failed: {source:#}",
        definition.version(),
        definition.name()
    );

    Error::MigrationFailed {
        version: definition.version(),
        name: definition.name().to_owned(),
        source,
    }
}
