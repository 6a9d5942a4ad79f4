//! Evidence comment endpoints.

use super::parse_id;
use crate::error::ApiResult;
use crate::json::JsonBody;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use custody_metadata::models::CommentRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub evidence_id: i64,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentResponse {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            evidence_id: row.evidence_id,
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentEnvelope {
    pub comment: CommentResponse,
}

#[derive(Debug, Serialize)]
pub struct CommentListEnvelope {
    pub comments: Vec<CommentResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddCommentRequest {
    pub text: String,
}

/// POST /v1/cases/{case_id}/evidences/{evidence_id}/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Path((case_id, evidence_id)): Path<(String, String)>,
    JsonBody(req): JsonBody<AddCommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentEnvelope>)> {
    let comment = state
        .coordinator
        .add_evidence_comment(parse_id(&case_id)?, parse_id(&evidence_id)?, &req.text)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommentEnvelope {
            comment: comment.into(),
        }),
    ))
}

/// GET /v1/cases/{case_id}/evidences/{evidence_id}/comments
pub async fn list_comments(
    State(state): State<AppState>,
    Path((case_id, evidence_id)): Path<(String, String)>,
) -> ApiResult<Json<CommentListEnvelope>> {
    let comments = state
        .coordinator
        .list_comments(parse_id(&case_id)?, parse_id(&evidence_id)?)
        .await?;

    Ok(Json(CommentListEnvelope {
        comments: comments.into_iter().map(CommentResponse::from).collect(),
    }))
}
