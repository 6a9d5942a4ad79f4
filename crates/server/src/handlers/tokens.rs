//! Token issuance and identity endpoints.

use crate::auth::AuthPayload;
use crate::error::ApiResult;
use crate::json::JsonBody;
use crate::metrics;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationToken {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationEnvelope {
    pub authentication_token: AuthenticationToken,
}

/// POST /v1/tokens/authentication - Exchange credentials for a bearer token.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AuthenticationRequest>,
) -> ApiResult<(StatusCode, Json<AuthenticationEnvelope>)> {
    let user = state
        .coordinator
        .authenticate(&req.username, &req.password)
        .await?;

    let (token, payload) = state
        .tokens
        .create_token(&user.username, state.config.auth.token_ttl())
        .map_err(custody_core::Error::from)?;

    metrics::TOKENS_ISSUED.inc();
    tracing::info!(username = %user.username, token_id = %payload.id, "Token issued");

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationEnvelope {
            authentication_token: AuthenticationToken {
                token,
                expires_at: payload.expires_at,
            },
        }),
    ))
}

/// Response for the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub username: String,
    pub token_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// GET /v1/auth/whoami - Echo the verified token identity.
pub async fn whoami(Extension(auth): Extension<AuthPayload>) -> Json<WhoamiResponse> {
    let payload = auth.0;
    Json(WhoamiResponse {
        username: payload.username,
        token_id: payload.id.to_string(),
        issued_at: payload.issued_at,
        expires_at: payload.expires_at,
    })
}
