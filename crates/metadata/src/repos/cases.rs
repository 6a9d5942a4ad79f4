//! Case repository.

use crate::error::MetadataResult;
use crate::models::CaseRow;
use async_trait::async_trait;

/// Repository for cases and their ownership.
#[async_trait]
pub trait CaseRepo: Send + Sync {
    /// Insert a case and link it to its owner in one transaction.
    /// Fails with `AlreadyExists` if the name is taken and `NotFound` if the user is gone.
    async fn create_case_for_user(&self, user_id: i64, name: &str) -> MetadataResult<CaseRow>;

    /// Get a case by ID.
    async fn get_case(&self, case_id: i64) -> MetadataResult<Option<CaseRow>>;

    /// Get a case by name.
    async fn get_case_by_name(&self, name: &str) -> MetadataResult<Option<CaseRow>>;

    /// List all cases in creation order.
    async fn list_cases(&self) -> MetadataResult<Vec<CaseRow>>;

    /// Count evidence rows referencing a case.
    async fn count_evidences(&self, case_id: i64) -> MetadataResult<u64>;

    /// Delete a case. Fails with `Constraint` while evidence still references it.
    async fn delete_case(&self, case_id: i64) -> MetadataResult<()>;
}
