//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem object store. Each case is a directory under the root.
pub struct FilesystemBackend {
    root: PathBuf,
}

fn map_not_found(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Hidden sibling path used while a write is in progress.
/// Object names never start with '.', so temp files cannot collide with objects.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp.{}", Uuid::new_v4()))
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, with traversal protection.
    ///
    /// `canonicalize` and `symlink_metadata` block, so validation runs on the
    /// blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous key validation. Rejects keys that would escape the root,
    /// including through symlinks.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, std::path::Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Walk from the path itself up to the nearest existing ancestor and make
        // sure it resolves inside the root. Covers both existing symlinks and
        // not-yet-created directories below a symlinked one.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
            candidate = current.parent();
        }

        Ok(path)
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path).await.map_err(map_not_found(key))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = temp_path_for(&path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            file,
            temp: TempFile(temp_path),
            final_path: path,
            key: key.to_string(),
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path).await.map_err(map_not_found(key))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}

/// Removes the temp file if an upload is dropped before finish or abort,
/// e.g. when the request that drives it is cancelled.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Streaming upload into a hidden temp file, published by hard link on finish.
struct FilesystemUpload {
    file: fs::File,
    temp: TempFile,
    final_path: PathBuf,
    key: String,
    bytes_written: u64,
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        if let Err(e) = self.file.write_all(&data).await {
            let _ = fs::remove_file(&self.temp.0).await;
            return Err(e.into());
        }
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let FilesystemUpload {
            file,
            temp,
            final_path,
            key,
            bytes_written,
        } = *self;

        let synced = file.sync_all().await;
        drop(file);
        if let Err(e) = synced {
            let _ = fs::remove_file(&temp.0).await;
            return Err(e.into());
        }

        // link() refuses to replace an existing file, so concurrent writers
        // of one key cannot both publish.
        let linked = fs::hard_link(&temp.0, &final_path).await;
        let _ = fs::remove_file(&temp.0).await;
        match linked {
            Ok(()) => Ok(bytes_written),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let FilesystemUpload { file, temp, .. } = *self;
        drop(file);
        match fs::remove_file(&temp.0).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (FilesystemBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        (backend, dir)
    }

    async fn upload(
        backend: &FilesystemBackend,
        key: &str,
        parts: &[&'static [u8]],
    ) -> StorageResult<u64> {
        let mut up = backend.put_stream(key).await?;
        for part in parts {
            up.write(Bytes::from_static(part)).await?;
        }
        up.finish().await
    }

    async fn read_all(backend: &FilesystemBackend, key: &str) -> Vec<u8> {
        use futures::TryStreamExt;

        let chunks: Vec<Bytes> = backend
            .get_stream(key)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        chunks.concat()
    }

    /// Visible object names in one case directory, ignoring in-flight temp files.
    fn visible_objects(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|name| !name.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_upload_then_read_back() {
        let (backend, _dir) = backend().await;

        let key = "case-1/object";
        assert_eq!(upload(&backend, key, &[b"hello", b" world"]).await.unwrap(), 11);
        assert!(backend.exists(key).await.unwrap());
        assert_eq!(read_all(&backend, key).await, b"hello world");
    }

    #[tokio::test]
    async fn test_streaming_upload_is_invisible_until_finish() {
        let (backend, dir) = backend().await;

        let mut up = backend.put_stream("case-1/disk.img").await.unwrap();
        up.write(Bytes::from_static(b"abc")).await.unwrap();
        assert!(!backend.exists("case-1/disk.img").await.unwrap());
        assert!(visible_objects(&dir.path().join("case-1")).is_empty());

        assert_eq!(up.finish().await.unwrap(), 3);
        assert_eq!(read_all(&backend, "case-1/disk.img").await, b"abc");
        assert_eq!(visible_objects(&dir.path().join("case-1")), ["disk.img"]);
    }

    #[tokio::test]
    async fn test_streaming_upload_does_not_clobber() {
        let (backend, dir) = backend().await;

        upload(&backend, "c/e", &[b"first"]).await.unwrap();
        let err = upload(&backend, "c/e", &[b"second"]).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)), "{err}");

        assert_eq!(read_all(&backend, "c/e").await, b"first");
        assert_eq!(visible_objects(&dir.path().join("c")), ["e"]);
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing_behind() {
        let (backend, dir) = backend().await;

        let mut up = backend.put_stream("c/partial").await.unwrap();
        up.write(Bytes::from_static(b"xyz")).await.unwrap();
        up.abort().await.unwrap();

        assert!(!backend.exists("c/partial").await.unwrap());
        let leftovers = std::fs::read_dir(dir.path().join("c")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_dropped_upload_removes_temp_file() {
        let (backend, dir) = backend().await;

        let mut up = backend.put_stream("c/cancelled").await.unwrap();
        up.write(Bytes::from_static(b"xyz")).await.unwrap();
        drop(up);

        assert!(!backend.exists("c/cancelled").await.unwrap());
        let leftovers = std::fs::read_dir(dir.path().join("c")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_get_stream_reads_everything() {
        use futures::TryStreamExt;

        let (backend, _dir) = backend().await;
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut up = backend.put_stream("c/big").await.unwrap();
        up.write(Bytes::from(data.clone())).await.unwrap();
        up.finish().await.unwrap();

        let chunks: Vec<Bytes> = backend
            .get_stream("c/big")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (backend, _dir) = backend().await;
        let err = backend.delete("c/nothing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (backend, _dir) = backend().await;

        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../bar").await.is_err());
        assert!(backend.exists("foo/../../etc/passwd").await.is_err());

        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let (backend, dir) = backend().await;
        let outside_dir = tempfile::tempdir().unwrap();
        let outside_file = outside_dir.path().join("secret.txt");
        std::fs::write(&outside_file, "secret data").unwrap();

        symlink(&outside_file, dir.path().join("malicious_link")).unwrap();
        match backend.get_stream("malicious_link").await {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            Err(other) => panic!("expected InvalidKey error, got: {other:?}"),
            Ok(_) => panic!("expected InvalidKey error, got a stream"),
        }

        symlink(outside_dir.path(), dir.path().join("escape")).unwrap();
        let result = backend.put_stream("escape/nested/file.txt").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(!outside_dir.path().join("nested").exists());
    }
}
