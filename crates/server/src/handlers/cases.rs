//! Case endpoints.

use super::parse_id;
use crate::auth::AuthPayload;
use crate::error::ApiResult;
use crate::json::JsonBody;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use custody_metadata::models::CaseRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct CaseResponse {
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<CaseRow> for CaseResponse {
    fn from(row: CaseRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CaseEnvelope {
    pub case: CaseResponse,
}

#[derive(Debug, Serialize)]
pub struct CaseListEnvelope {
    pub cases: Vec<CaseResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCaseRequest {
    pub name: String,
}

/// POST /v1/cases - Create a case owned by the caller.
pub async fn create_case(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthPayload>,
    JsonBody(req): JsonBody<CreateCaseRequest>,
) -> ApiResult<(StatusCode, Json<CaseEnvelope>)> {
    let case = state
        .coordinator
        .create_case(auth.username(), &req.name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CaseEnvelope { case: case.into() }),
    ))
}

/// GET /v1/cases - List all cases in creation order.
pub async fn list_cases(State(state): State<AppState>) -> ApiResult<Json<CaseListEnvelope>> {
    let cases = state.coordinator.list_cases().await?;
    Ok(Json(CaseListEnvelope {
        cases: cases.into_iter().map(CaseResponse::from).collect(),
    }))
}

/// GET /v1/cases/{case_id}
pub async fn get_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<Json<CaseEnvelope>> {
    let case = state.coordinator.get_case(parse_id(&case_id)?).await?;
    Ok(Json(CaseEnvelope { case: case.into() }))
}

/// DELETE /v1/cases/{case_id} - Remove a case that holds no evidence.
pub async fn delete_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<StatusCode> {
    let case = state.coordinator.get_case(parse_id(&case_id)?).await?;
    state.coordinator.remove_case(&case.name).await?;
    Ok(StatusCode::NO_CONTENT)
}
