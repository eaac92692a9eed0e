use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = KeystoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Store is inconsistent: {0}")]
    Corrupt(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KeystoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
