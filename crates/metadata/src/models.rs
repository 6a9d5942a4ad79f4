//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;

/// User account. Only referenced by case ownership.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

/// Case record.
#[derive(Debug, Clone, FromRow)]
pub struct CaseRow {
    pub id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
}

/// Evidence record. The blob lives in object storage under (case name, evidence name).
#[derive(Debug, Clone, FromRow)]
pub struct EvidenceRow {
    pub id: i64,
    pub case_id: i64,
    pub name: String,
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub hash: String,
    pub size: i64,
    pub created_at: OffsetDateTime,
}

/// Fields supplied when inserting evidence.
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub case_id: i64,
    pub name: String,
    pub hash: String,
    pub size: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub evidence_id: i64,
    pub text: String,
    pub created_at: OffsetDateTime,
}
