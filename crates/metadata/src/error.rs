//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

impl MetadataError {
    /// Reclassify a failed INSERT. Unique violations become `AlreadyExists`,
    /// foreign-key violations become `NotFound` for the referenced parent.
    pub(crate) fn from_insert(err: sqlx::Error, entity: &str, parent: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::AlreadyExists(entity.to_string());
            }
            if db_err.is_foreign_key_violation() {
                return Self::NotFound(parent.to_string());
            }
        }
        Self::Database(err)
    }

    /// Reclassify a failed DELETE. A foreign-key violation means dependent
    /// rows still reference the target.
    pub(crate) fn from_delete(err: sqlx::Error, entity: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_foreign_key_violation()
        {
            return Self::Constraint(format!("{entity} is still referenced"));
        }
        Self::Database(err)
    }
}

impl From<MetadataError> for custody_core::Error {
    fn from(err: MetadataError) -> Self {
        use custody_core::Error;
        match err {
            MetadataError::NotFound(what) => Error::not_found(format!("{what} not found")),
            MetadataError::AlreadyExists(what) => Error::exists(format!("{what} already exists")),
            MetadataError::Constraint(msg) => Error::conflict(msg),
            MetadataError::Invalid(msg) => Error::invalid(msg),
            MetadataError::Database(sqlx::Error::RowNotFound) => {
                Error::not_found("record not found")
            }
            MetadataError::Database(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() =>
            {
                Error::exists_with(
                    "record already exists",
                    sqlx::Error::Database(db_err),
                )
            }
            other => Error::unknown_with("metadata store failure", other),
        }
    }
}
