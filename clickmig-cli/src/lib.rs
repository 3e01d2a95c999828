#![forbid(unsafe_code)]

mod config;

pub use config::*;

use clap::{Parser, Subcommand};
use clickmig::{Error, ExclusiveLock, MigrationContext, MigrationSet, Result};
use std::{ffi::OsString, path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;

/// Coordinated schema migrations for analytical databases.
#[derive(Debug, Parser)]
#[command(name = "clickmig", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "clickmig.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply pending migrations.
    Migrate {
        /// Stop after this version.
        #[arg(long)]
        version: Option<u64>,
    },

    /// Roll back applied migrations, the latest one by default.
    Rollback {
        /// Roll back every migration above this version. 0 rolls back all.
        #[arg(long)]
        version: Option<u64>,

        /// Number of migrations to roll back when no version is given.
        #[arg(long, conflicts_with = "version")]
        step: Option<usize>,
    },

    /// Apply a single migration.
    Up {
        #[arg(long)]
        version: u64,
    },

    /// Roll back a single migration.
    Down {
        #[arg(long)]
        version: u64,
    },

    /// List migrations and whether they are applied.
    Status,
}

/// Entry point for binaries embedding their own migrations.
pub async fn run<I, T>(args: I, set: MigrationSet) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    match execute(&cli, set).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: &Cli, set: MigrationSet) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let lock = ExclusiveLock::new(config.lease_store().await?, config.lock_config());
    let context = MigrationContext::new(set, config.databases(), lock);

    dispatch(&cli.command, &context).await
}

/// Runs `command` and prints its outcome.
pub async fn dispatch(command: &Command, context: &MigrationContext) -> Result<()> {
    match command {
        Command::Migrate { version } => {
            let applied = context.migrate(*version).await?;
            println!("{} migration(s) applied", applied.len());
        }
        Command::Rollback { version, step } => {
            let reverted = context.rollback(*version, *step).await?;
            println!("{} migration(s) rolled back", reverted.len());
        }
        Command::Up { version } => {
            if !context.up(*version).await? {
                println!("{version} is already applied");
            }
        }
        Command::Down { version } => {
            if !context.down(*version).await? {
                println!("{version} is not applied");
            }
        }
        Command::Status => {
            println!("{:<8} {:<16} {:<12} name", "status", "version", "database");

            for status in context.status().await? {
                println!(
                    "{:<8} {:<16} {:<12} {}",
                    if status.active { "up" } else { "down" },
                    status.version,
                    status.database,
                    status.name.as_deref().unwrap_or("** NO DEFINITION **")
                );
            }
        }
    }

    Ok(())
}

/// Stable name of the error kind, printed before the message.
pub fn error_class(err: &Error) -> &'static str {
    match err {
        Error::Lock(_) => "lock",
        Error::UnknownMigrationVersion(_) => "unknown_migration_version",
        Error::DuplicateMigrationName(_) => "duplicate_migration_name",
        Error::DuplicateMigrationVersion(_) => "duplicate_migration_version",
        Error::Configuration(_) => "configuration",
        Error::MigrationFailed { .. } => "migration_failed",
        Error::Store(_) => "store",
        Error::Client(_) => "client",
        Error::Any(_) => "error",
    }
}

fn report(err: &Error) {
    eprintln!("error[{}]: {err}", error_class(err));

    if let Some(hint) = err.hint() {
        eprintln!("hint: {hint}");
    }
}
