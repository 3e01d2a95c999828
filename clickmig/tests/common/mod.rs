#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use clickmig::{
    client::MemoryEngine as ClientEngine, sql, store::MemoryEngine as StoreEngine, Client,
    Databases, Definition, ExclusiveLock, LeaseStore, LockConfig, ManualClock, MigrationContext,
    MigrationSet,
};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn clock() -> ManualClock {
    ManualClock::new(start())
}

/// A coordination store shared by every lock built from it.
pub fn store_engine(clock: &ManualClock) -> StoreEngine {
    StoreEngine::with_clock(clock.clone())
}

pub fn lease_store(engine: &StoreEngine, clock: &ManualClock) -> LeaseStore {
    LeaseStore::with_clock(engine.clone(), clock.clone())
}

pub fn lock(engine: &StoreEngine, clock: &ManualClock, config: LockConfig) -> ExclusiveLock {
    ExclusiveLock::new(lease_store(engine, clock), config)
}

pub fn create_events() -> Definition {
    Definition::new(
        1,
        "create_events",
        sql("CREATE TABLE events (id UInt64) ENGINE = MergeTree ORDER BY id"),
    )
    .down(sql("DROP TABLE events"))
}

pub fn add_region() -> Definition {
    Definition::new(
        2,
        "add_region",
        sql("ALTER TABLE events ADD COLUMN region LowCardinality(String)"),
    )
    .down(sql("ALTER TABLE events DROP COLUMN region"))
}

pub fn create_sessions() -> Definition {
    Definition::new(
        3,
        "create_sessions",
        sql("CREATE TABLE sessions (id UInt64) ENGINE = MergeTree ORDER BY id"),
    )
    .down(sql("DROP TABLE sessions"))
}

pub fn migrations() -> MigrationSet {
    MigrationSet::new(vec![create_events(), add_region(), create_sessions()]).unwrap()
}

pub struct Harness {
    pub clock: ManualClock,
    pub store: StoreEngine,
    pub main: ClientEngine,
    pub context: MigrationContext,
}

impl Harness {
    pub fn new(set: MigrationSet) -> Self {
        Self::with_config(set, LockConfig::default())
    }

    pub fn with_config(set: MigrationSet, config: LockConfig) -> Self {
        let clock = clock();
        let store = store_engine(&clock);
        let main = ClientEngine::new();
        let databases = Databases::new().with("main", Client::new(main.clone()));
        let context = MigrationContext::new(set, databases, lock(&store, &clock, config));

        Self {
            clock,
            store,
            main,
            context,
        }
    }

    /// Another process sharing the coordination store.
    pub fn other_process(&self) -> LeaseStore {
        lease_store(&self.store, &self.clock)
    }
}
