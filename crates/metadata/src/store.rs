//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{CaseRepo, CommentRepo, EvidenceRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UserRepo + CaseRepo + EvidenceRepo + CommentRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single writer connection; concurrent requests queue on the pool.
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(query_timeout_secs.unwrap_or(60)))
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(
            &self,
            username: &str,
            password_hash: &str,
        ) -> MetadataResult<UserRow> {
            if self.get_user_by_username(username).await?.is_some() {
                return Err(MetadataError::AlreadyExists(format!("user {username:?}")));
            }

            sqlx::query_as::<_, UserRow>(
                "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?) RETURNING *",
            )
            .bind(username)
            .bind(password_hash)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, &format!("user {username:?}"), "user"))
        }

        async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn update_password_hash(
            &self,
            user_id: i64,
            password_hash: &str,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
                .bind(password_hash)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("user {user_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CaseRepo for SqliteStore {
        async fn create_case_for_user(&self, user_id: i64, name: &str) -> MetadataResult<CaseRow> {
            if self.get_case_by_name(name).await?.is_some() {
                return Err(MetadataError::AlreadyExists(format!("case {name:?}")));
            }

            let mut tx = self.pool.begin().await?;

            let case = sqlx::query_as::<_, CaseRow>(
                "INSERT INTO cases (name, created_at) VALUES (?, ?) RETURNING *",
            )
            .bind(name)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| MetadataError::from_insert(e, &format!("case {name:?}"), "case"))?;

            sqlx::query("INSERT INTO user_cases (user_id, case_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(case.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    MetadataError::from_insert(e, "case ownership", &format!("user {user_id}"))
                })?;

            tx.commit().await?;
            Ok(case)
        }

        async fn get_case(&self, case_id: i64) -> MetadataResult<Option<CaseRow>> {
            let row = sqlx::query_as::<_, CaseRow>("SELECT * FROM cases WHERE id = ?")
                .bind(case_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_case_by_name(&self, name: &str) -> MetadataResult<Option<CaseRow>> {
            let row = sqlx::query_as::<_, CaseRow>("SELECT * FROM cases WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_cases(&self) -> MetadataResult<Vec<CaseRow>> {
            let rows = sqlx::query_as::<_, CaseRow>("SELECT * FROM cases ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn count_evidences(&self, case_id: i64) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evidences WHERE case_id = ?")
                .bind(case_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }

        async fn delete_case(&self, case_id: i64) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM cases WHERE id = ?")
                .bind(case_id)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::from_delete(e, &format!("case {case_id}")))?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("case {case_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EvidenceRepo for SqliteStore {
        async fn create_evidence(&self, evidence: &NewEvidence) -> MetadataResult<EvidenceRow> {
            sqlx::query_as::<_, EvidenceRow>(
                r#"
                INSERT INTO evidences (case_id, name, hash, size, created_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(evidence.case_id)
            .bind(&evidence.name)
            .bind(&evidence.hash)
            .bind(evidence.size)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(
                    e,
                    &format!("evidence {:?}", evidence.name),
                    &format!("case {}", evidence.case_id),
                )
            })
        }

        async fn get_evidence(
            &self,
            case_id: i64,
            evidence_id: i64,
        ) -> MetadataResult<Option<EvidenceRow>> {
            let row = sqlx::query_as::<_, EvidenceRow>(
                "SELECT * FROM evidences WHERE id = ? AND case_id = ?",
            )
            .bind(evidence_id)
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_evidence_by_name(
            &self,
            case_id: i64,
            name: &str,
        ) -> MetadataResult<Option<EvidenceRow>> {
            let row = sqlx::query_as::<_, EvidenceRow>(
                "SELECT * FROM evidences WHERE case_id = ? AND name = ?",
            )
            .bind(case_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_evidences(&self, case_id: i64) -> MetadataResult<Vec<EvidenceRow>> {
            let rows = sqlx::query_as::<_, EvidenceRow>(
                "SELECT * FROM evidences WHERE case_id = ? ORDER BY id",
            )
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_evidence(&self, case_id: i64, evidence_id: i64) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM evidences WHERE id = ? AND case_id = ?")
                .bind(evidence_id)
                .bind(case_id)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::from_delete(e, &format!("evidence {evidence_id}")))?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("evidence {evidence_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for SqliteStore {
        async fn create_comment(&self, evidence_id: i64, text: &str) -> MetadataResult<CommentRow> {
            sqlx::query_as::<_, CommentRow>(
                "INSERT INTO comments (evidence_id, text, created_at) VALUES (?, ?, ?) RETURNING *",
            )
            .bind(evidence_id)
            .bind(text)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, "comment", &format!("evidence {evidence_id}"))
            })
        }

        async fn list_comments(&self, evidence_id: i64) -> MetadataResult<Vec<CommentRow>> {
            let rows = sqlx::query_as::<_, CommentRow>(
                "SELECT * FROM comments WHERE evidence_id = ? ORDER BY id",
            )
            .bind(evidence_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_cases (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, case_id)
);
CREATE INDEX IF NOT EXISTS idx_user_cases_case ON user_cases(case_id);

-- A case cannot be deleted while evidence references it.
CREATE TABLE IF NOT EXISTS evidences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL REFERENCES cases(id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (case_id, name)
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    evidence_id INTEGER NOT NULL REFERENCES evidences(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_comments_evidence ON comments(evidence_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEvidence;
    use tempfile::TempDir;

    async fn store() -> (SqliteStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("metadata.db"), None)
            .await
            .unwrap();
        (store, dir)
    }

    async fn owners(store: &SqliteStore, case_id: i64) -> Vec<i64> {
        sqlx::query_scalar("SELECT user_id FROM user_cases WHERE case_id = ? ORDER BY user_id")
            .bind(case_id)
            .fetch_all(&store.pool)
            .await
            .unwrap()
    }

    fn evidence(case_id: i64, name: &str) -> NewEvidence {
        NewEvidence {
            case_id,
            name: name.to_string(),
            hash: "00".repeat(32),
            size: 0,
        }
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (store, _dir) = store().await;
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (store, _dir) = store().await;
        store.create_user("alice", "h1").await.unwrap();
        let err = store.create_user("alice", "h2").await.unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_case_creation_links_owner() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        let case = store.create_case_for_user(user.id, "case-1").await.unwrap();

        assert_eq!(owners(&store, case.id).await, vec![user.id]);
        let by_name = store.get_case_by_name("case-1").await.unwrap().unwrap();
        assert_eq!(by_name.id, case.id);
    }

    #[tokio::test]
    async fn test_case_for_missing_user_rolls_back() {
        let (store, _dir) = store().await;
        let err = store.create_case_for_user(999, "orphan").await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)), "{err}");
        assert!(store.get_case_by_name("orphan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_case_name_rejected() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        store.create_case_for_user(user.id, "dup").await.unwrap();
        let err = store.create_case_for_user(user.id, "dup").await.unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_evidence_unique_within_case() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        let a = store.create_case_for_user(user.id, "a").await.unwrap();
        let b = store.create_case_for_user(user.id, "b").await.unwrap();

        store.create_evidence(&evidence(a.id, "disk.img")).await.unwrap();
        store.create_evidence(&evidence(b.id, "disk.img")).await.unwrap();
        let err = store
            .create_evidence(&evidence(a.id, "disk.img"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)), "{err}");
    }

    #[tokio::test]
    async fn test_evidence_for_missing_case_is_not_found() {
        let (store, _dir) = store().await;
        let err = store.create_evidence(&evidence(42, "x")).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn test_evidence_lookup_requires_matching_case() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        let a = store.create_case_for_user(user.id, "a").await.unwrap();
        let b = store.create_case_for_user(user.id, "b").await.unwrap();
        let ev = store.create_evidence(&evidence(a.id, "one")).await.unwrap();

        assert!(store.get_evidence(a.id, ev.id).await.unwrap().is_some());
        assert!(store.get_evidence(b.id, ev.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_evidences_in_insertion_order() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        let case = store.create_case_for_user(user.id, "ordered").await.unwrap();
        for name in ["zeta", "alpha", "mid"] {
            store.create_evidence(&evidence(case.id, name)).await.unwrap();
        }

        let names: Vec<_> = store
            .list_evidences(case.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_delete_case_with_evidence_is_constraint() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        let case = store.create_case_for_user(user.id, "busy").await.unwrap();
        store.create_evidence(&evidence(case.id, "e")).await.unwrap();

        assert_eq!(store.count_evidences(case.id).await.unwrap(), 1);
        let err = store.delete_case(case.id).await.unwrap_err();
        assert!(matches!(err, MetadataError::Constraint(_)), "{err}");
    }

    #[tokio::test]
    async fn test_delete_empty_case() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        let case = store.create_case_for_user(user.id, "empty").await.unwrap();

        store.delete_case(case.id).await.unwrap();
        assert!(store.get_case(case.id).await.unwrap().is_none());
        assert!(owners(&store, case.id).await.is_empty());

        let err = store.delete_case(case.id).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_comments_follow_evidence() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "h").await.unwrap();
        let case = store.create_case_for_user(user.id, "c").await.unwrap();
        let ev = store.create_evidence(&evidence(case.id, "e")).await.unwrap();

        store.create_comment(ev.id, "first").await.unwrap();
        store.create_comment(ev.id, "second").await.unwrap();
        let texts: Vec<_> = store
            .list_comments(ev.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, ["first", "second"]);

        store.delete_evidence(case.id, ev.id).await.unwrap();
        assert!(store.list_comments(ev.id).await.unwrap().is_empty());

        let err = store.create_comment(ev.id, "late").await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn test_update_password_hash() {
        let (store, _dir) = store().await;
        let user = store.create_user("alice", "old").await.unwrap();
        store.update_password_hash(user.id, "new").await.unwrap();
        let reloaded = store.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new");

        let err = store.update_password_hash(999, "x").await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }
}
