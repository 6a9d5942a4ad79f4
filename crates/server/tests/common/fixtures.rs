//! Test fixtures for generating test data.

use bytes::Bytes;
use custody_storage::{ByteStream, StorageError};
use sha2::{Digest, Sha256};

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Compute SHA-256 hash of data as lowercase hex.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Split data into chunks of specified size.
#[allow(dead_code)]
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    data.chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect()
}

/// A body stream yielding `data` in `chunk_size` pieces.
#[allow(dead_code)]
pub fn chunked_body(data: &[u8], chunk_size: usize) -> ByteStream {
    let chunks: Vec<_> = split_into_chunks(data, chunk_size)
        .into_iter()
        .map(Ok)
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// A body stream that yields `prefix` and then fails like a dropped client.
#[allow(dead_code)]
pub fn broken_body(prefix: &[u8]) -> ByteStream {
    let items = vec![
        Ok(Bytes::copy_from_slice(prefix)),
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client went away",
        ))),
    ];
    Box::pin(futures::stream::iter(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let a = seeded_bytes(42, 100);
        let b = seeded_bytes(42, 100);
        assert_eq!(a, b);

        let c = seeded_bytes(43, 100);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_into_chunks() {
        let data = seeded_bytes(1, 100);
        let chunks = split_into_chunks(&data, 30);
        assert_eq!(chunks.len(), 4); // 30 + 30 + 30 + 10

        let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(reassembled, data.as_ref());
    }
}
