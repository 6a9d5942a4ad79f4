//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use custody_storage::{
    ByteStream, FilesystemBackend, ObjectStore, StorageError, StorageResult, StreamingUpload,
};
use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

/// A test storage wrapper that cleans up on drop.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestStorage {
    pub backend: Arc<dyn ObjectStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStorage {
    /// Create a new test storage with a temporary directory.
    pub async fn new() -> StorageResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(temp_dir.path()).await?;

        Ok(Self {
            backend: Arc::new(backend),
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the object store.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.backend.clone()
    }

    /// Number of published blobs.
    pub fn blob_count(&self) -> usize {
        count_blobs(self._temp_dir.path())
    }
}

/// Count published blobs under a filesystem store root, ignoring in-flight
/// temp files.
#[allow(dead_code)]
pub fn count_blobs(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| if e.path().is_dir() { count_blobs(&e.path()) } else { 1 })
        .sum()
}

/// Read a whole blob back.
#[allow(dead_code)]
pub async fn read_blob(store: &dyn ObjectStore, key: &str) -> StorageResult<Bytes> {
    let chunks: Vec<Bytes> = store.get_stream(key).await?.try_collect().await?;
    Ok(chunks.concat().into())
}

/// Create a blob directly, bypassing the coordinator.
#[allow(dead_code)]
pub async fn seed_blob(
    store: &dyn ObjectStore,
    key: &str,
    data: &'static [u8],
) -> StorageResult<()> {
    let mut upload = store.put_stream(key).await?;
    upload.write(Bytes::from_static(data)).await?;
    upload.finish().await.map(|_| ())
}

/// Object store that fails selected operations on demand.
#[allow(dead_code)]
pub struct FaultyStorage {
    inner: Arc<dyn ObjectStore>,
    pub fail_delete: AtomicBool,
    pub fail_get_stream: AtomicBool,
}

#[allow(dead_code)]
impl FaultyStorage {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_delete: AtomicBool::new(false),
            fail_get_stream: AtomicBool::new(false),
        }
    }

    fn injected(op: &str) -> StorageError {
        StorageError::Io(std::io::Error::other(format!("injected {op} failure")))
    }
}

#[async_trait]
impl ObjectStore for FaultyStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        if self.fail_get_stream.load(Ordering::SeqCst) {
            return Err(Self::injected("get_stream"));
        }
        self.inner.get_stream(key).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        self.inner.put_stream(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
