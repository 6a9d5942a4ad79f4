//! Comment repository.

use crate::error::MetadataResult;
use crate::models::CommentRow;
use async_trait::async_trait;

/// Repository for evidence comments. Comments are append-only.
#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Add a comment. Fails with `NotFound` if the evidence is gone.
    async fn create_comment(&self, evidence_id: i64, text: &str) -> MetadataResult<CommentRow>;

    /// List comments of an evidence in creation order.
    async fn list_comments(&self, evidence_id: i64) -> MetadataResult<Vec<CommentRow>>;
}
