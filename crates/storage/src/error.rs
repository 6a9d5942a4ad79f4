//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for custody_core::Error {
    fn from(err: StorageError) -> Self {
        use custody_core::Error;
        match err {
            StorageError::NotFound(key) => Error::not_found(format!("blob {key} not found")),
            StorageError::AlreadyExists(key) => Error::exists(format!("blob {key} already exists")),
            StorageError::InvalidKey(msg) => Error::invalid(msg),
            other => Error::unknown_with("blob store failure", other),
        }
    }
}
