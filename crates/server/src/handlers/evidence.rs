//! Evidence endpoints.
//!
//! Evidence content travels as a raw request/response body, never as JSON.

use super::parse_id;
use crate::coordinator::body_stream;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::extract::rejection::QueryRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use custody_core::Error;
use custody_metadata::models::EvidenceRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub id: i64,
    pub case_id: i64,
    pub name: String,
    /// Lowercase hex SHA-256 of the content.
    pub hash: String,
    pub size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<EvidenceRow> for EvidenceResponse {
    fn from(row: EvidenceRow) -> Self {
        Self {
            id: row.id,
            case_id: row.case_id,
            name: row.name,
            hash: row.hash,
            size: row.size,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EvidenceEnvelope {
    pub evidence: EvidenceResponse,
}

#[derive(Debug, Serialize)]
pub struct EvidenceListEnvelope {
    pub evidences: Vec<EvidenceResponse>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEvidenceQuery {
    pub name: Option<String>,
}

/// POST /v1/cases/{case_id}/evidences?name=<name> - Upload new evidence.
pub async fn create_evidence(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    query: Result<Query<CreateEvidenceQuery>, QueryRejection>,
    body: Body,
) -> ApiResult<(StatusCode, Json<EvidenceEnvelope>)> {
    let case_id = parse_id(&case_id)?;
    let name = query
        .ok()
        .and_then(|Query(q)| q.name)
        .ok_or_else(|| Error::invalid("query parameter \"name\" is required"))?;

    let evidence = state
        .coordinator
        .create_evidence(case_id, &name, body_stream(body))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(EvidenceEnvelope {
            evidence: evidence.into(),
        }),
    ))
}

/// GET /v1/cases/{case_id}/evidences - List evidence in creation order.
pub async fn list_evidences(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<Json<EvidenceListEnvelope>> {
    let evidences = state
        .coordinator
        .list_evidences(parse_id(&case_id)?)
        .await?;

    Ok(Json(EvidenceListEnvelope {
        evidences: evidences.into_iter().map(EvidenceResponse::from).collect(),
    }))
}

/// GET /v1/cases/{case_id}/evidences/{evidence_id}
pub async fn get_evidence(
    State(state): State<AppState>,
    Path((case_id, evidence_id)): Path<(String, String)>,
) -> ApiResult<Json<EvidenceEnvelope>> {
    let evidence = state
        .coordinator
        .get_evidence(parse_id(&case_id)?, parse_id(&evidence_id)?)
        .await?;

    Ok(Json(EvidenceEnvelope {
        evidence: evidence.into(),
    }))
}

/// GET /v1/cases/{case_id}/evidences/{evidence_id}/content - Stream evidence bytes.
pub async fn download_evidence(
    State(state): State<AppState>,
    Path((case_id, evidence_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (evidence, stream) = state
        .coordinator
        .download_evidence(parse_id(&case_id)?, parse_id(&evidence_id)?)
        .await?;

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(evidence.size));
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", evidence.hash)) {
        headers.insert(header::ETAG, etag);
    }
    // Names are restricted to a header-safe charset.
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", evidence.name))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok(response)
}

/// DELETE /v1/cases/{case_id}/evidences/{evidence_id}
pub async fn delete_evidence(
    State(state): State<AppState>,
    Path((case_id, evidence_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .coordinator
        .delete_evidence(parse_id(&case_id)?, parse_id(&evidence_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
