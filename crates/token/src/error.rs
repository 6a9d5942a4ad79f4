//! Token error types.

use thiserror::Error;

/// Token operation errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Verification failed. Expiry, bad signature and malformed input all
    /// collapse into this one variant.
    #[error("invalid token")]
    Invalid,

    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("token encoding error: {0}")]
    Encoding(String),
}

/// Result type for token operations.
pub type TokenResult<T> = std::result::Result<T, TokenError>;

impl From<TokenError> for custody_core::Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => custody_core::Error::invalid_credentials("invalid token"),
            other => custody_core::Error::unknown_with("token service failure", other),
        }
    }
}
