use clickmig_client::ClientError;
use clickmig_store::StoreError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another migration is in progress (lease `{key}` is held)")]
    LeaseHeld { key: String },

    #[error("timed out after {}s waiting for active workers: {}", waited.as_secs(), workers.join(", "))]
    WorkersActive {
        waited: Duration,
        workers: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("unknown migration version {0}")]
    UnknownMigrationVersion(u64),

    #[error("multiple migrations have the name `{0}`")]
    DuplicateMigrationName(String),

    #[error("multiple migrations have the version number {0}")]
    DuplicateMigrationVersion(u64),

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("An error occurred, all later migrations canceled:\n\n{version} {name}: {source:#}")]
    MigrationFailed {
        version: u64,
        name: String,
        source: anyhow::Error,
    },

    #[error("store `{0}`")]
    Store(#[from] StoreError),

    #[error("client `{0}`")]
    Client(#[from] ClientError),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

impl Error {
    /// Short operator guidance for errors that need a human decision.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::Lock(_) => Some("the migration was not started; retry the command later"),
            Error::UnknownMigrationVersion(_)
            | Error::DuplicateMigrationName(_)
            | Error::DuplicateMigrationVersion(_) => {
                Some("check the migration set registered for this deployment")
            }
            Error::Configuration(_) => Some("check the databases declared in the configuration"),
            _ => None,
        }
    }

    pub fn is_lock(&self) -> bool {
        matches!(self, Error::Lock(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
