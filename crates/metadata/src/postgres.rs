//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{CaseRepo, CommentRepo, EvidenceRepo, UserRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use custody_core::config::{PgSslMode, PostgresConfig, PostgresTarget};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect, then bring the schema up to date.
    pub async fn from_config(config: &PostgresConfig) -> MetadataResult<Self> {
        let target = config.target().map_err(MetadataError::Config)?;
        let mut opts = match target {
            PostgresTarget::Url(url) => {
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PgConnectOptions::from_str(url)?
            }
            PostgresTarget::Host { host, database } => {
                tracing::info!(
                    host,
                    port = config.port,
                    database,
                    username = config.username.as_deref().unwrap_or("<none>"),
                    ssl_mode = ?config.ssl_mode,
                    "Connecting to PostgreSQL"
                );
                let mut opts = PgConnectOptions::new()
                    .host(host)
                    .port(config.port)
                    .database(database)
                    .ssl_mode(sqlx_ssl_mode(config.ssl_mode));
                if let Some(user) = &config.username {
                    opts = opts.username(user);
                }
                if let Some(password) = &config.password {
                    opts = opts.password(password);
                }
                opts
            }
        };

        if let Some(timeout_ms) = config.statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

fn sqlx_ssl_mode(mode: PgSslMode) -> SqlxPgSslMode {
    match mode {
        PgSslMode::Disable => SqlxPgSslMode::Disable,
        PgSslMode::Prefer => SqlxPgSslMode::Prefer,
        PgSslMode::Require => SqlxPgSslMode::Require,
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepo for PostgresStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> MetadataResult<UserRow> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, password_hash, created_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(username)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MetadataError::from_insert(e, &format!("user {username:?}"), "user"))
    }

    async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> MetadataResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
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
impl CaseRepo for PostgresStore {
    async fn create_case_for_user(&self, user_id: i64, name: &str) -> MetadataResult<CaseRow> {
        let mut tx = self.pool.begin().await?;

        // The unique index on name settles concurrent creators.
        let case = sqlx::query_as::<_, CaseRow>(
            "INSERT INTO cases (name, created_at) VALUES ($1, $2) RETURNING *",
        )
        .bind(name)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| MetadataError::from_insert(e, &format!("case {name:?}"), "case"))?;

        sqlx::query("INSERT INTO user_cases (user_id, case_id) VALUES ($1, $2)")
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
        let row = sqlx::query_as::<_, CaseRow>("SELECT * FROM cases WHERE id = $1")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_case_by_name(&self, name: &str) -> MetadataResult<Option<CaseRow>> {
        let row = sqlx::query_as::<_, CaseRow>("SELECT * FROM cases WHERE name = $1")
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
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM evidences WHERE case_id = $1")
            .bind(case_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn delete_case(&self, case_id: i64) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM cases WHERE id = $1")
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
impl EvidenceRepo for PostgresStore {
    async fn create_evidence(&self, evidence: &NewEvidence) -> MetadataResult<EvidenceRow> {
        sqlx::query_as::<_, EvidenceRow>(
            r#"
            INSERT INTO evidences (case_id, name, hash, size, created_at)
            VALUES ($1, $2, $3, $4, $5)
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
            "SELECT * FROM evidences WHERE id = $1 AND case_id = $2",
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
            "SELECT * FROM evidences WHERE case_id = $1 AND name = $2",
        )
        .bind(case_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_evidences(&self, case_id: i64) -> MetadataResult<Vec<EvidenceRow>> {
        let rows = sqlx::query_as::<_, EvidenceRow>(
            "SELECT * FROM evidences WHERE case_id = $1 ORDER BY id",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_evidence(&self, case_id: i64, evidence_id: i64) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM evidences WHERE id = $1 AND case_id = $2")
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
impl CommentRepo for PostgresStore {
    async fn create_comment(&self, evidence_id: i64, text: &str) -> MetadataResult<CommentRow> {
        sqlx::query_as::<_, CommentRow>(
            "INSERT INTO comments (evidence_id, text, created_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(evidence_id)
        .bind(text)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MetadataError::from_insert(e, "comment", &format!("evidence {evidence_id}")))
    }

    async fn list_comments(&self, evidence_id: i64) -> MetadataResult<Vec<CommentRow>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT * FROM comments WHERE evidence_id = $1 ORDER BY id",
        )
        .bind(evidence_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::{POSTGRES_SCHEMA, postgres_schema_statements};

    #[test]
    fn postgres_schema_statements_skips_empty_and_comment_only() {
        let schema = r#"
            -- comment only

            CREATE TABLE foo (id int);
            ;
            -- another comment
            CREATE TABLE bar (id int);
        "#;

        let statements = postgres_schema_statements(schema);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE foo"));
        assert!(statements[1].contains("CREATE TABLE bar"));
    }

    #[test]
    fn embedded_schema_creates_every_table() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        for table in ["users", "cases", "user_cases", "evidences", "comments"] {
            let needle = format!("CREATE TABLE IF NOT EXISTS {table} ");
            assert!(
                statements.iter().any(|s| s.contains(&needle)),
                "missing table {table}"
            );
        }
    }
}
