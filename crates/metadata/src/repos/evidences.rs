//! Evidence repository.

use crate::error::MetadataResult;
use crate::models::{EvidenceRow, NewEvidence};
use async_trait::async_trait;

/// Repository for evidence records.
///
/// Evidence is always addressed together with its case so that an ID from
/// one case can never resolve evidence belonging to another.
#[async_trait]
pub trait EvidenceRepo: Send + Sync {
    /// Insert evidence. Fails with `AlreadyExists` if the name is already used
    /// in the case and `NotFound` if the case is gone.
    async fn create_evidence(&self, evidence: &NewEvidence) -> MetadataResult<EvidenceRow>;

    /// Get evidence by (case, evidence) ID pair.
    async fn get_evidence(
        &self,
        case_id: i64,
        evidence_id: i64,
    ) -> MetadataResult<Option<EvidenceRow>>;

    /// Get evidence by name within a case.
    async fn get_evidence_by_name(
        &self,
        case_id: i64,
        name: &str,
    ) -> MetadataResult<Option<EvidenceRow>>;

    /// List evidence of a case in creation order.
    async fn list_evidences(&self, case_id: i64) -> MetadataResult<Vec<EvidenceRow>>;

    /// Delete evidence and its comments.
    async fn delete_evidence(&self, case_id: i64, evidence_id: i64) -> MetadataResult<()>;
}
