#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unsupported statement `{0}`")]
    Unsupported(String),

    #[error("table `{0}` does not exist")]
    UnknownTable(String),

    #[error("table `{0}` already exists")]
    TableExists(String),

    #[cfg(feature = "http")]
    #[error("reqwest `{0}`")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
