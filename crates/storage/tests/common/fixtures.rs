use bytes::Bytes;
use custody_storage::backends::filesystem::FilesystemBackend;
use tempfile::TempDir;

/// Deterministic test payload. Same seed produces same bytes.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

pub async fn filesystem_backend() -> (FilesystemBackend, TempDir) {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path()).await.unwrap();
    (backend, dir)
}
