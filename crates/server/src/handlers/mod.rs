//! HTTP request handlers.

pub mod cases;
pub mod comments;
pub mod evidence;
pub mod health;
pub mod tokens;
pub mod users;

pub use cases::*;
pub use comments::*;
pub use evidence::*;
pub use health::*;
pub use tokens::*;
pub use users::*;

use crate::error::ApiResult;

/// Parse a path identifier. Identifiers are positive integers.
pub(crate) fn parse_id(raw: &str) -> ApiResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(custody_core::Error::invalid("invalid id parameter").into()),
    }
}
