//! Authentication and authorization middleware.
//!
//! Gated routes run two layers in order:
//! 1. [`access_middleware`] verifies the bearer token and attaches an [`AuthPayload`].
//! 2. [`permission_middleware`] authorizes on the presence of that payload.
//!
//! Both reject with the same `401` response, so callers cannot tell a missing
//! header from an expired or forged token.

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use custody_token::Payload;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// Truncated to MAX_TRACE_ID_LEN characters, with non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verified token identity, carried as a request extension.
#[derive(Clone, Debug)]
pub struct AuthPayload(pub Payload);

impl AuthPayload {
    pub fn username(&self) -> &str {
        &self.0.username
    }
}

/// Extract the credential for `scheme` from an Authorization header value.
///
/// The scheme must match exactly and be followed by a single space and a
/// non-empty token.
fn extract_token<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (given_scheme, token) = header.split_once(' ')?;
    if given_scheme != scheme || token.is_empty() {
        return None;
    }
    Some(token)
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

fn reject(reason: &'static str) -> ApiError {
    metrics::AUTH_REJECTIONS.with_label_values(&[reason]).inc();
    tracing::debug!(reason, "request rejected by access middleware");
    ApiError::Unauthorized
}

/// Validate the bearer token and attach its payload to the request.
pub async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        username = tracing::field::Empty,
    );
    req.extensions_mut().insert(trace_id);

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| reject("missing_header"))?
        .to_str()
        .map_err(|_| reject("malformed_header"))?;

    let token = extract_token(header, &state.config.auth.scheme)
        .ok_or_else(|| reject("wrong_scheme"))?;

    let payload = state
        .tokens
        .verify_token(token)
        .map_err(|_| reject("invalid_token"))?;

    span.record("username", payload.username.as_str());
    req.extensions_mut().insert(AuthPayload(payload));

    Ok(next.run(req).instrument(span).await)
}

/// Authorize a request that already passed [`access_middleware`].
///
/// Any verified, non-empty identity is allowed.
pub async fn permission_middleware(req: Request, next: Next) -> Result<Response, ApiError> {
    match req.extensions().get::<AuthPayload>() {
        Some(auth) if !auth.username().is_empty() => Ok(next.run(req).await),
        Some(_) => {
            metrics::AUTH_REJECTIONS
                .with_label_values(&["empty_username"])
                .inc();
            Err(ApiError::Unauthorized)
        }
        None => {
            metrics::AUTH_REJECTIONS
                .with_label_values(&["missing_payload"])
                .inc();
            Err(ApiError::Unauthorized)
        }
    }
}
