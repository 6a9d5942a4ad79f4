//! Evidence lifecycle coordination across the metadata and blob stores.
//!
//! The two stores are never updated atomically. Evidence creation writes the
//! blob first and removes it again if the metadata insert fails; evidence
//! deletion removes the metadata row first. A creation cancelled between the
//! two writes removes its blob from a background task. When a compensating
//! step fails, the operation reports an [`Inconsistency`] and leaves repair to
//! an operator.

use crate::metrics;
use bytes::Bytes;
use custody_core::{
    ContentHasher, Error, Inconsistency, Result, validate_case_name, validate_evidence_name,
};
use custody_metadata::{MetadataError, MetadataStore};
use custody_metadata::models::{CaseRow, CommentRow, EvidenceRow, NewEvidence, UserRow};
use custody_storage::{ByteStream, ObjectStore, StorageError, StreamingUpload, evidence_key};
use futures::StreamExt;
use std::sync::Arc;
use tracing::instrument;

/// Orchestrates multi-store operations on cases, evidence and comments.
#[derive(Clone)]
pub struct Coordinator {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
}

impl Coordinator {
    pub fn new(metadata: Arc<dyn MetadataStore>, storage: Arc<dyn ObjectStore>) -> Self {
        Self { metadata, storage }
    }

    // =========================================================================
    // Cases
    // =========================================================================

    /// Create a case owned by `username`.
    #[instrument(skip(self))]
    pub async fn create_case(&self, username: &str, name: &str) -> Result<CaseRow> {
        validate_case_name(name)?;

        let user = self
            .metadata
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| Error::not_found("user not found"))?;

        let case = self.metadata.create_case_for_user(user.id, name).await?;

        metrics::CASES_CREATED.inc();
        tracing::info!(case_id = case.id, case = %case.name, owner = %username, "Case created");
        Ok(case)
    }

    /// Remove an empty case. Blobs are never touched.
    #[instrument(skip(self))]
    pub async fn remove_case(&self, name: &str) -> Result<()> {
        let case = self
            .metadata
            .get_case_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("case not found"))?;

        if self.metadata.count_evidences(case.id).await? > 0 {
            return Err(Error::conflict("case still has evidence"));
        }

        // Evidence created after the count is caught by the foreign key.
        match self.metadata.delete_case(case.id).await {
            Ok(()) => {}
            Err(MetadataError::Constraint(_)) => {
                return Err(Error::conflict("case still has evidence"));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(case_id = case.id, case = %case.name, "Case removed");
        Ok(())
    }

    pub async fn list_cases(&self) -> Result<Vec<CaseRow>> {
        Ok(self.metadata.list_cases().await?)
    }

    pub async fn get_case(&self, case_id: i64) -> Result<CaseRow> {
        self.metadata
            .get_case(case_id)
            .await?
            .ok_or_else(|| Error::not_found("case not found"))
    }

    // =========================================================================
    // Evidence
    // =========================================================================

    pub async fn list_evidences(&self, case_id: i64) -> Result<Vec<EvidenceRow>> {
        let case = self.get_case(case_id).await?;
        Ok(self.metadata.list_evidences(case.id).await?)
    }

    pub async fn get_evidence(&self, case_id: i64, evidence_id: i64) -> Result<EvidenceRow> {
        self.resolve_evidence(case_id, evidence_id)
            .await
            .map(|(_, evidence)| evidence)
    }

    /// Resolve evidence by its (case, evidence) ID pair.
    async fn resolve_evidence(
        &self,
        case_id: i64,
        evidence_id: i64,
    ) -> Result<(CaseRow, EvidenceRow)> {
        let case = self.get_case(case_id).await?;
        let evidence = self
            .metadata
            .get_evidence(case.id, evidence_id)
            .await?
            .ok_or_else(|| Error::not_found("evidence not found"))?;
        Ok((case, evidence))
    }

    /// Store `body` as new evidence in a case.
    ///
    /// The blob is written and hashed first, then the metadata row is
    /// inserted. A failed insert removes the blob again.
    #[instrument(skip(self, body))]
    pub async fn create_evidence(
        &self,
        case_id: i64,
        name: &str,
        body: ByteStream,
    ) -> Result<EvidenceRow> {
        validate_evidence_name(name)?;
        let case = self.get_case(case_id).await?;

        if self
            .metadata
            .get_evidence_by_name(case.id, name)
            .await?
            .is_some()
        {
            return Err(Error::exists("evidence already exists"));
        }

        let key = evidence_key(&case.name, name);
        if self.storage.exists(&key).await? {
            tracing::warn!(key = %key, "Blob exists without an evidence record");
            return Err(Error::exists("evidence already exists"));
        }

        let (hash, size) = self.write_blob(&key, body).await?;
        // Armed until the insert outcome is settled. Dropping the future in
        // between (timeout, disconnect) hands the blob to a cleanup task.
        let pending = PendingBlob {
            metadata: self.metadata.clone(),
            storage: self.storage.clone(),
            case_id: case.id,
            case: case.name.clone(),
            evidence: name.to_string(),
            key: key.clone(),
            armed: true,
        };

        let new_evidence = NewEvidence {
            case_id: case.id,
            name: name.to_string(),
            hash,
            size: size as i64,
        };

        match self.metadata.create_evidence(&new_evidence).await {
            Ok(evidence) => {
                pending.disarm();
                metrics::EVIDENCE_CREATED.inc();
                tracing::info!(
                    case_id = case.id,
                    evidence_id = evidence.id,
                    size,
                    hash = %evidence.hash,
                    "Evidence created"
                );
                Ok(evidence)
            }
            Err(insert_err) => {
                let err = Error::from(insert_err);
                let reported = self.roll_back_blob(&case.name, name, &key, err).await;
                pending.disarm();
                Err(reported)
            }
        }
    }

    /// Stream `body` into a create-only upload while hashing it.
    ///
    /// Returns the lowercase hex SHA-256 and the byte count.
    async fn write_blob(&self, key: &str, mut body: ByteStream) -> Result<(String, u64)> {
        let mut upload = self.storage.put_stream(key).await?;
        let mut hasher = ContentHasher::default();

        while let Some(chunk) = body.next().await {
            let data = match chunk {
                Ok(data) => data,
                Err(e) => {
                    abort_upload(upload, key).await;
                    return Err(Error::invalid_with("request body could not be read", e));
                }
            };
            hasher.update(&data);
            if let Err(e) = upload.write(data).await {
                abort_upload(upload, key).await;
                return Err(e.into());
            }
        }

        let size = upload.finish().await.map_err(|e| match e {
            StorageError::AlreadyExists(_) => Error::exists("evidence already exists"),
            other => other.into(),
        })?;

        debug_assert_eq!(size, hasher.len());
        Ok((hasher.finalize().to_hex(), size))
    }

    /// Compensate a failed evidence insert by removing the written blob.
    ///
    /// Returns the error to report: the original one when the blob is gone,
    /// a `RollbackFailed` inconsistency otherwise.
    async fn roll_back_blob(&self, case: &str, evidence: &str, key: &str, err: Error) -> Error {
        match self.storage.delete(key).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {
                metrics::EVIDENCE_ROLLBACKS.inc();
                tracing::info!(key = %key, error = %err, "Evidence insert failed, blob removed");
                err
            }
            Err(delete_err) => {
                let inconsistency = Inconsistency::RollbackFailed {
                    case: case.to_string(),
                    evidence: evidence.to_string(),
                };
                metrics::record_inconsistency(inconsistency.state());
                tracing::error!(
                    key = %key,
                    insert_error = %err,
                    delete_error = %delete_err,
                    state = inconsistency.state(),
                    "Evidence insert failed and blob could not be removed"
                );
                Error::inconsistent(inconsistency)
            }
        }
    }

    /// Delete evidence. The metadata row goes first, then the blob.
    #[instrument(skip(self))]
    pub async fn delete_evidence(&self, case_id: i64, evidence_id: i64) -> Result<()> {
        let (case, evidence) = self.resolve_evidence(case_id, evidence_id).await?;

        self.metadata.delete_evidence(case.id, evidence.id).await?;
        metrics::EVIDENCE_DELETED.inc();

        let key = evidence_key(&case.name, &evidence.name);
        match self.storage.delete(&key).await {
            Ok(()) => {
                tracing::info!(case_id = case.id, evidence_id = evidence.id, "Evidence deleted");
                Ok(())
            }
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(key = %key, "Evidence deleted but its blob was already absent");
                Ok(())
            }
            Err(e) => {
                let inconsistency = Inconsistency::OrphanedBlob {
                    case: case.name.clone(),
                    evidence: evidence.name.clone(),
                };
                metrics::record_inconsistency(inconsistency.state());
                tracing::error!(
                    key = %key,
                    error = %e,
                    state = inconsistency.state(),
                    "Evidence record deleted but blob could not be removed"
                );
                Err(Error::inconsistent(inconsistency))
            }
        }
    }

    /// Open evidence content for streaming.
    pub async fn download_evidence(
        &self,
        case_id: i64,
        evidence_id: i64,
    ) -> Result<(EvidenceRow, ByteStream)> {
        let (case, evidence) = self.resolve_evidence(case_id, evidence_id).await?;
        let key = evidence_key(&case.name, &evidence.name);

        let stream = self.storage.get_stream(&key).await.map_err(|e| {
            tracing::error!(key = %key, error = %e, "Evidence blob unavailable");
            Error::unknown_with("evidence content unavailable", e)
        })?;

        Ok((evidence, stream))
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub async fn add_evidence_comment(
        &self,
        case_id: i64,
        evidence_id: i64,
        text: &str,
    ) -> Result<CommentRow> {
        if text.trim().is_empty() {
            return Err(Error::invalid("comment text must not be empty"));
        }
        let (_, evidence) = self.resolve_evidence(case_id, evidence_id).await?;
        Ok(self.metadata.create_comment(evidence.id, text).await?)
    }

    pub async fn list_comments(&self, case_id: i64, evidence_id: i64) -> Result<Vec<CommentRow>> {
        let (_, evidence) = self.resolve_evidence(case_id, evidence_id).await?;
        Ok(self.metadata.list_comments(evidence.id).await?)
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    #[instrument(skip(self, password))]
    pub async fn create_user(&self, username: &str, password: &str) -> Result<UserRow> {
        if username.is_empty() {
            return Err(Error::invalid("username must not be empty"));
        }
        if password.is_empty() {
            return Err(Error::invalid("password must not be empty"));
        }

        let hash = hash_password(password).await?;
        let user = self.metadata.create_user(username, &hash).await?;
        tracing::info!(user_id = user.id, username = %user.username, "User created");
        Ok(user)
    }

    #[instrument(skip(self, new_password))]
    pub async fn rotate_password(&self, username: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::invalid("password must not be empty"));
        }
        let user = self
            .metadata
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| Error::not_found("user not found"))?;

        let hash = hash_password(new_password).await?;
        self.metadata.update_password_hash(user.id, &hash).await?;
        tracing::info!(user_id = user.id, "Password rotated");
        Ok(())
    }

    /// Check a username and password.
    ///
    /// Unknown users and wrong passwords both yield `InvalidCredentials`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<UserRow> {
        let invalid = || Error::invalid_credentials("invalid authentication credentials");

        let Some(user) = self.metadata.get_user_by_username(username).await? else {
            return Err(invalid());
        };

        let password = password.to_string();
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || {
            custody_core::password::verify_password(&password, &stored)
        })
        .await
        .map_err(|e| Error::unknown_with("password verification task failed", e))??;

        if matches { Ok(user) } else { Err(invalid()) }
    }
}

/// A published blob whose evidence row is not settled yet.
///
/// Dropped while armed, it spawns a task that removes the blob unless the
/// row turned out to be committed. A failed removal is reported as a
/// `RollbackFailed` inconsistency.
struct PendingBlob {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
    case_id: i64,
    case: String,
    evidence: String,
    key: String,
    armed: bool,
}

impl PendingBlob {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let metadata = self.metadata.clone();
        let storage = self.storage.clone();
        let case_id = self.case_id;
        let case = std::mem::take(&mut self.case);
        let evidence = std::mem::take(&mut self.evidence);
        let key = std::mem::take(&mut self.key);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            report_rollback_failure(case, evidence, &key, "no runtime to remove the blob");
            return;
        };

        handle.spawn(async move {
            match metadata.get_evidence_by_name(case_id, &evidence).await {
                Ok(Some(_)) => {
                    tracing::info!(key = %key, "Evidence creation cancelled after its row was committed");
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Could not check evidence row after cancellation");
                }
            }

            match storage.delete(&key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {
                    metrics::EVIDENCE_ROLLBACKS.inc();
                    tracing::warn!(key = %key, "Evidence creation cancelled, blob removed");
                }
                Err(e) => report_rollback_failure(case, evidence, &key, &e.to_string()),
            }
        });
    }
}

fn report_rollback_failure(case: String, evidence: String, key: &str, cause: &str) {
    let inconsistency = Inconsistency::RollbackFailed { case, evidence };
    metrics::record_inconsistency(inconsistency.state());
    tracing::error!(
        key = %key,
        error = %cause,
        state = inconsistency.state(),
        "Evidence creation cancelled and blob could not be removed"
    );
}

/// Hash a password off the async runtime.
async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || custody_core::password::hash_password(&password))
        .await
        .map_err(|e| Error::unknown_with("password hashing task failed", e))?
}

async fn abort_upload(upload: Box<dyn StreamingUpload>, key: &str) {
    if let Err(e) = upload.abort().await {
        tracing::warn!(key = %key, error = %e, "Failed to abort evidence upload");
    }
}

/// Adapt a request body into a [`ByteStream`].
pub fn body_stream(body: axum::body::Body) -> ByteStream {
    Box::pin(body.into_data_stream().map(|chunk: std::result::Result<Bytes, axum::Error>| {
        chunk.map_err(|e| StorageError::Io(std::io::Error::other(e)))
    }))
}
