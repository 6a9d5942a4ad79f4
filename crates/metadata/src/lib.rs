//! Metadata store abstraction and implementations for the custody service.
//!
//! This crate owns the authoritative relational records:
//! - Users and their password hashes
//! - Cases and case ownership
//! - Evidence records with content hashes
//! - Evidence comments

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use custody_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres(pg) => {
            let store = PostgresStore::from_config(pg).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
