//! API error types.
//!
//! `ApiError` is the single place where failures become HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use custody_core::ErrorKind;
use serde::Serialize;

/// Response message for rejected or missing tokens.
pub const UNAUTHORIZED_MESSAGE: &str = "invalid or missing authentication token";

const INTERNAL_MESSAGE: &str = "the server encountered a problem and could not process your request";

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A classified domain failure.
    #[error(transparent)]
    Domain(#[from] custody_core::Error),

    /// The request body could not be decoded.
    #[error("{0}")]
    MalformedBody(String),

    /// Missing, malformed or rejected credentials.
    #[error("{UNAUTHORIZED_MESSAGE}")]
    Unauthorized,
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(e) => e.kind().as_str(),
            Self::MalformedBody(_) => "malformed_body",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Domain(e) => match e.kind() {
                ErrorKind::Invalid => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::Exists => StatusCode::CONFLICT,
                ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
                ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message shown to the caller. Server-side failures are never echoed.
    fn public_message(&self) -> String {
        match self {
            Self::Domain(e) if e.kind() == ErrorKind::Unknown => INTERNAL_MESSAGE.to_string(),
            Self::Domain(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

/// Render an error and its source chain on one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %error_chain(&self), "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
