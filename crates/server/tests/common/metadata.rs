//! Metadata store test utilities.

use async_trait::async_trait;
use custody_core::config::PostgresConfig;
use custody_metadata::models::{CaseRow, CommentRow, EvidenceRow, NewEvidence, UserRow};
use custody_metadata::repos::{CaseRepo, CommentRepo, EvidenceRepo, UserRepo};
use custody_metadata::{MetadataError, MetadataResult, MetadataStore, PostgresStore, SqliteStore};
use sqlx::{Pool, Postgres as SqlxPostgres};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a new test metadata store backed by a temporary SQLite file.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = SqliteStore::new(&db_path, None).await?;

        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the metadata store.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// PostgreSQL test metadata store wrapper that manages a testcontainer.
#[allow(dead_code)]
pub struct PostgresTestMetadata {
    pub store: Arc<dyn MetadataStore>,
    pub(crate) postgres_store: Arc<PostgresStore>,
    _container: ContainerAsync<Postgres>,
}

#[allow(dead_code)]
impl PostgresTestMetadata {
    /// Create a new PostgreSQL test store with a testcontainer.
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let mut config = PostgresConfig::with_url(format!(
            "postgres://postgres:postgres@{}:{}/postgres",
            host, port
        ));
        config.max_connections = 5;
        config.statement_timeout_ms = None;

        let store = Arc::new(PostgresStore::from_config(&config).await?);

        Ok(Self {
            store: store.clone(),
            postgres_store: store,
            _container: container,
        })
    }

    /// Get a reference to the metadata store.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// Get a reference to the PostgreSQL connection pool for raw queries.
    pub fn pool(&self) -> &Pool<SqlxPostgres> {
        self.postgres_store.pool()
    }
}

/// Try to create a PostgreSQL test store, skipping if Docker is unavailable
/// or SKIP_POSTGRES_TESTS is set.
///
/// Only container-start failures cause a skip. Schema, migration, or
/// connection errors still panic.
#[allow(dead_code)]
pub async fn postgres_or_skip() -> Option<PostgresTestMetadata> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match PostgresTestMetadata::new().await {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}

/// Run a test against both SQLite and PostgreSQL backends.
#[allow(dead_code)]
pub async fn run_metadata_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn MetadataStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestMetadata::new()
        .await
        .expect("Failed to create SQLite test metadata");
    test_fn.clone()(sqlite.store()).await;

    if let Some(postgres) = postgres_or_skip().await {
        test_fn(postgres.store()).await;
    }
}

/// Metadata store that fails or stalls evidence inserts on demand.
#[allow(dead_code)]
pub struct FaultyMetadata {
    inner: Arc<dyn MetadataStore>,
    /// Fail inserts with an internal store error.
    pub fail_create_evidence: AtomicBool,
    /// Fail inserts as if a concurrent writer took the name first.
    pub duplicate_create_evidence: AtomicBool,
    /// Sleep this long before each insert reaches the inner store.
    pub create_evidence_delay_ms: AtomicU64,
}

#[allow(dead_code)]
impl FaultyMetadata {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Self {
        Self {
            inner,
            fail_create_evidence: AtomicBool::new(false),
            duplicate_create_evidence: AtomicBool::new(false),
            create_evidence_delay_ms: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl UserRepo for FaultyMetadata {
    async fn create_user(&self, username: &str, password_hash: &str) -> MetadataResult<UserRow> {
        self.inner.create_user(username, password_hash).await
    }

    async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
        self.inner.get_user_by_username(username).await
    }

    async fn update_password_hash(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> MetadataResult<()> {
        self.inner.update_password_hash(user_id, password_hash).await
    }
}

#[async_trait]
impl CaseRepo for FaultyMetadata {
    async fn create_case_for_user(&self, user_id: i64, name: &str) -> MetadataResult<CaseRow> {
        self.inner.create_case_for_user(user_id, name).await
    }

    async fn get_case(&self, case_id: i64) -> MetadataResult<Option<CaseRow>> {
        self.inner.get_case(case_id).await
    }

    async fn get_case_by_name(&self, name: &str) -> MetadataResult<Option<CaseRow>> {
        self.inner.get_case_by_name(name).await
    }

    async fn list_cases(&self) -> MetadataResult<Vec<CaseRow>> {
        self.inner.list_cases().await
    }

    async fn count_evidences(&self, case_id: i64) -> MetadataResult<u64> {
        self.inner.count_evidences(case_id).await
    }

    async fn delete_case(&self, case_id: i64) -> MetadataResult<()> {
        self.inner.delete_case(case_id).await
    }
}

#[async_trait]
impl EvidenceRepo for FaultyMetadata {
    async fn create_evidence(&self, evidence: &NewEvidence) -> MetadataResult<EvidenceRow> {
        let delay_ms = self.create_evidence_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.duplicate_create_evidence.load(Ordering::SeqCst) {
            return Err(MetadataError::AlreadyExists("evidence".to_string()));
        }
        if self.fail_create_evidence.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal(
                "injected create_evidence failure".to_string(),
            ));
        }
        self.inner.create_evidence(evidence).await
    }

    async fn get_evidence(
        &self,
        case_id: i64,
        evidence_id: i64,
    ) -> MetadataResult<Option<EvidenceRow>> {
        self.inner.get_evidence(case_id, evidence_id).await
    }

    async fn get_evidence_by_name(
        &self,
        case_id: i64,
        name: &str,
    ) -> MetadataResult<Option<EvidenceRow>> {
        self.inner.get_evidence_by_name(case_id, name).await
    }

    async fn list_evidences(&self, case_id: i64) -> MetadataResult<Vec<EvidenceRow>> {
        self.inner.list_evidences(case_id).await
    }

    async fn delete_evidence(&self, case_id: i64, evidence_id: i64) -> MetadataResult<()> {
        self.inner.delete_evidence(case_id, evidence_id).await
    }
}

#[async_trait]
impl CommentRepo for FaultyMetadata {
    async fn create_comment(&self, evidence_id: i64, text: &str) -> MetadataResult<CommentRow> {
        self.inner.create_comment(evidence_id, text).await
    }

    async fn list_comments(&self, evidence_id: i64) -> MetadataResult<Vec<CommentRow>> {
        self.inner.list_comments(evidence_id).await
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
