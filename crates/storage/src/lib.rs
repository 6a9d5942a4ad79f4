//! Object storage abstraction and backends for evidence blobs.
//!
//! This crate provides:
//! - A name-addressed object store with create-only streaming writes
//! - The evidence key layout (one container per case)
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectStore, StreamingUpload};

use custody_core::config::StorageConfig;
use std::sync::Arc;

/// Object key of an evidence blob: the case name is the container.
pub fn evidence_key(case_name: &str, evidence_name: &str) -> String {
    format!("{case_name}/{evidence_name}")
}

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3(s3) => Ok(Arc::new(S3Backend::new(s3)?)),
    }
}
