#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The server does not implement a primitive. Callers probe for this and
    /// switch to a compatible fallback.
    #[error("store primitive `{0}` is not supported by this server")]
    Unsupported(&'static str),

    #[cfg(feature = "pg")]
    #[error("sqlx `{0}`")]
    Sqlx(#[from] sqlx::Error),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, StoreError::Unsupported(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
