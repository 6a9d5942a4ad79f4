//! User account endpoints.

use crate::error::ApiResult;
use crate::json::JsonBody;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use custody_metadata::models::UserRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Public view of a user. The password hash never leaves the server.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotatePasswordRequest {
    pub password: String,
}

/// POST /v1/users - Create a user account.
pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserEnvelope>)> {
    let user = state
        .coordinator
        .create_user(&req.username, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope { user: user.into() }),
    ))
}

/// PUT /v1/users/{username}/password - Replace a user's password.
pub async fn rotate_password(
    State(state): State<AppState>,
    Path(username): Path<String>,
    JsonBody(req): JsonBody<RotatePasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .coordinator
        .rotate_password(&username, &req.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
