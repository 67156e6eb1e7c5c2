//! Content identity: a streaming XXH64 digest paired with the byte size.

use std::io::Read;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh64::Xxh64;

/// Seed for the digest. Changing it invalidates every stored identity.
const DIGEST_SEED: u64 = 0;

/// Read buffer size for streaming hashes.
const CHUNK_SIZE: usize = 64 * 1024;

/// Deduplication key for a media file, independent of its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentIdentity {
    /// 16 lower-case hex characters, zero-padded.
    pub digest: String,
    pub size: u64,
}

impl ContentIdentity {
    pub fn new(digest: impl Into<String>, size: u64) -> Self {
        Self {
            digest: digest.into(),
            size,
        }
    }

    /// Stable asset id handed to the remote service for its own dedup.
    pub fn device_asset_id(&self) -> String {
        format!("{}-{}", self.digest, self.size)
    }
}

/// Hash a reader to completion without buffering it in memory.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Xxh64::new(DIGEST_SEED);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:016x}", hasher.digest()))
}

/// Compute the identity of a file on disk.
///
/// The size comes from file metadata, the digest from streaming the content.
pub fn identify_file_blocking(path: &Path) -> std::io::Result<ContentIdentity> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let digest = hash_reader(std::io::BufReader::new(file))?;
    Ok(ContentIdentity { digest, size })
}

/// Async wrapper that runs the hash on the blocking pool.
pub async fn identify_file(path: &Path) -> anyhow::Result<ContentIdentity> {
    let path: PathBuf = path.to_path_buf();
    let identity = tokio::task::spawn_blocking(move || identify_file_blocking(&path)).await??;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_digest_is_fixed_width_hex() {
        let digest = hash_reader(Cursor::new(b"hello world")).unwrap();
        assert_eq!(digest.len(), 16);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_empty_input_known_digest() {
        // XXH64 of empty input with seed 0
        assert_eq!(hash_reader(Cursor::new(b"")).unwrap(), "ef46db3751d8e999");
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = hash_reader(Cursor::new(&data)).unwrap();
        let one_shot = format!("{:016x}", xxhash_rust::xxh64::xxh64(&data, DIGEST_SEED));
        assert_eq!(streamed, one_shot);
    }

    #[test]
    fn test_different_content_different_digest() {
        let a = hash_reader(Cursor::new(b"aaaa")).unwrap();
        let b = hash_reader(Cursor::new(b"aaab")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_ignores_path() {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("one.jpg");
        let two = dir.path().join("nested_two.png");
        std::fs::write(&one, b"same bytes").unwrap();
        std::fs::write(&two, b"same bytes").unwrap();

        let a = identify_file_blocking(&one).unwrap();
        let b = identify_file_blocking(&two).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size, 10);
    }

    #[test]
    fn test_device_asset_id_format() {
        let id = ContentIdentity::new("00000000deadbeef", 42);
        assert_eq!(id.device_asset_id(), "00000000deadbeef-42");
    }

    #[tokio::test]
    async fn test_identify_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(identify_file(&dir.path().join("gone.jpg")).await.is_err());
    }
}
