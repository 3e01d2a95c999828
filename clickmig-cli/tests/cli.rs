use clap::Parser;
use clickmig::{
    client::MemoryEngine as ClientEngine, sql, store::MemoryEngine as StoreEngine, Client,
    Databases, Definition, Error, ExclusiveLock, LeaseStore, LockConfig, MigrationContext,
    MigrationSet, MIGRATION_LEASE_KEY,
};
use clickmig_cli::{dispatch, error_class, Cli, Command};
use std::{path::PathBuf, time::Duration};

fn context(store: &StoreEngine, main: &ClientEngine) -> MigrationContext {
    let set = MigrationSet::new(vec![
        Definition::new(
            1,
            "create_events",
            sql("CREATE TABLE events (id UInt64) ENGINE = MergeTree ORDER BY id"),
        )
        .down(sql("DROP TABLE events")),
        Definition::new(
            2,
            "create_sessions",
            sql("CREATE TABLE sessions (id UInt64) ENGINE = MergeTree ORDER BY id"),
        )
        .down(sql("DROP TABLE sessions")),
    ])
    .unwrap();

    MigrationContext::new(
        set,
        Databases::new().with("main", Client::new(main.clone())),
        ExclusiveLock::new(LeaseStore::new(store.clone()), LockConfig::default()),
    )
}

#[test]
fn parses_subcommands() {
    let cli = Cli::try_parse_from(["clickmig", "migrate"]).unwrap();
    assert_eq!(cli.config, PathBuf::from("clickmig.toml"));
    assert_eq!(cli.command, Command::Migrate { version: None });

    let cli = Cli::try_parse_from(["clickmig", "-c", "prod.toml", "migrate", "--version", "20240101"])
        .unwrap();
    assert_eq!(cli.config, PathBuf::from("prod.toml"));
    assert_eq!(
        cli.command,
        Command::Migrate {
            version: Some(20240101)
        }
    );

    let cli = Cli::try_parse_from(["clickmig", "rollback", "--step", "3"]).unwrap();
    assert_eq!(
        cli.command,
        Command::Rollback {
            version: None,
            step: Some(3)
        }
    );

    let cli = Cli::try_parse_from(["clickmig", "down", "--version", "7"]).unwrap();
    assert_eq!(cli.command, Command::Down { version: 7 });

    assert!(Cli::try_parse_from(["clickmig", "up"]).is_err());
    assert!(Cli::try_parse_from(["clickmig", "rollback", "--version", "1", "--step", "2"]).is_err());
}

#[tokio::test]
async fn dispatches_commands() {
    let store = StoreEngine::new();
    let main = ClientEngine::new();
    let context = context(&store, &main);

    dispatch(&Command::Migrate { version: Some(1) }, &context)
        .await
        .unwrap();
    assert_eq!(context.pending().await.unwrap(), vec![2]);

    dispatch(&Command::Up { version: 2 }, &context).await.unwrap();
    dispatch(&Command::Status, &context).await.unwrap();

    dispatch(
        &Command::Rollback {
            version: Some(0),
            step: None,
        },
        &context,
    )
    .await
    .unwrap();
    assert_eq!(main.tables(), vec!["schema_migrations"]);

    dispatch(&Command::Down { version: 1 }, &context).await.unwrap();
}

#[tokio::test]
async fn errors_carry_class_and_hint() {
    let store = StoreEngine::new();
    let main = ClientEngine::new();
    let context = context(&store, &main);

    let err = dispatch(&Command::Up { version: 42 }, &context)
        .await
        .unwrap_err();
    assert_eq!(error_class(&err), "unknown_migration_version");
    assert!(err.hint().is_some());

    LeaseStore::new(store.clone())
        .try_acquire_lease(MIGRATION_LEASE_KEY, Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let err = dispatch(&Command::Migrate { version: None }, &context)
        .await
        .unwrap_err();
    assert_eq!(error_class(&err), "lock");
    assert!(err.hint().unwrap().contains("retry"));

    let err = Error::Configuration("database `events` is not configured".to_owned());
    assert_eq!(error_class(&err), "configuration");
}
