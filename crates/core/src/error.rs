//! Caller-facing error taxonomy.
//!
//! Every store-facing operation classifies its failures into one of these
//! kinds before returning. Backend error types never cross this boundary.

use std::fmt;
use thiserror::Error;

/// Boxed underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input or a violated local precondition.
    #[error("{message}")]
    Invalid {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A referenced entity is absent.
    #[error("{message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The operation conflicts with existing state (e.g. a case that still holds evidence).
    #[error("{message}")]
    Conflict {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A uniqueness violation.
    #[error("{message}")]
    Exists {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Authentication input rejected.
    #[error("{message}")]
    InvalidCredentials {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Unclassified failure, including downstream infrastructure errors.
    #[error("{message}")]
    Unknown {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Field-less discriminant of [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Conflict,
    Exists,
    InvalidCredentials,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Exists => "already_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unknown => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Residual cross-store inconsistency left behind by a failed compensation.
///
/// Reported through [`Error::Unknown`] and never repaired automatically.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Inconsistency {
    /// The evidence insert failed and removing the already written blob failed too.
    #[error("rollback failed: blob for evidence {evidence:?} in case {case:?} has no metadata row")]
    RollbackFailed { case: String, evidence: String },

    /// The metadata row was deleted but the blob could not be removed.
    #[error("orphaned blob: evidence {evidence:?} in case {case:?} was deleted but its blob remains")]
    OrphanedBlob { case: String, evidence: String },
}

impl Inconsistency {
    /// Short label used for logs and metrics.
    pub fn state(&self) -> &'static str {
        match self {
            Self::RollbackFailed { .. } => "rollback_failed",
            Self::OrphanedBlob { .. } => "orphaned_blob",
        }
    }
}

macro_rules! constructors {
    ($($variant:ident => $plain:ident, $with:ident;)*) => {
        $(
            pub fn $plain(message: impl Into<String>) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            pub fn $with(
                message: impl Into<String>,
                source: impl Into<BoxError>,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(source.into()),
                }
            }
        )*
    };
}

impl Error {
    constructors! {
        Invalid => invalid, invalid_with;
        NotFound => not_found, not_found_with;
        Conflict => conflict, conflict_with;
        Exists => exists, exists_with;
        InvalidCredentials => invalid_credentials, invalid_credentials_with;
        Unknown => unknown, unknown_with;
    }

    /// Report a residual inconsistency. Always classified as `Unknown`.
    pub fn inconsistent(inconsistency: Inconsistency) -> Self {
        Self::Unknown {
            message: inconsistency.to_string(),
            source: Some(Box::new(inconsistency)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Exists { .. } => ErrorKind::Exists,
            Self::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Invalid { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::Exists { message, .. }
            | Self::InvalidCredentials { message, .. }
            | Self::Unknown { message, .. } => message,
        }
    }

    /// The inconsistency carried by an `Unknown` error, if any.
    pub fn inconsistency(&self) -> Option<&Inconsistency> {
        match self {
            Self::Unknown {
                source: Some(source),
                ..
            } => source.downcast_ref::<Inconsistency>(),
            _ => None,
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
