//! SHA-256 content digests computed over bounded-size reads.
//!
//! Files are never loaded whole: the reader is drained one chunk at a time so
//! a single very large file costs at most `chunk_size` bytes of buffer.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::utils::errors::{AgentError, Result};

/// Default read size per chunk (8KB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Length of a rendered digest (hex characters)
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash everything `reader` yields, reading `chunk_size` bytes at a time.
///
/// A `chunk_size` of zero is treated as one byte.
pub fn digest_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash the contents of the file at `path`.
///
/// # Errors
///
/// Returns `AgentError::Hash` if the file cannot be opened or read to the end.
/// Callers scanning a tree treat this as "file is unhashable" and move on.
pub fn digest_file(path: &Path, chunk_size: usize) -> Result<String> {
    let file = File::open(path).map_err(|source| AgentError::Hash {
        path: path.to_path_buf(),
        source,
    })?;

    digest_reader(file, chunk_size).map_err(|source| AgentError::Hash {
        path: path.to_path_buf(),
        source,
    })
}

/// Hash an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Reader that fails after handing out a few bytes.
    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
            }
            self.served = true;
            buf[0] = b'x';
            Ok(1)
        }
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            digest_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_deterministic() -> io::Result<()> {
        let data = b"restored share contents";
        let first = digest_reader(Cursor::new(data), DEFAULT_CHUNK_SIZE)?;
        let second = digest_reader(Cursor::new(data), DEFAULT_CHUNK_SIZE)?;
        assert_eq!(first, second);
        assert_eq!(first.len(), DIGEST_HEX_LEN);
        Ok(())
    }

    #[test]
    fn test_single_byte_change_detected() -> io::Result<()> {
        let original = b"payroll-2024.csv,1200,approved".to_vec();
        let mut flipped = original.clone();
        flipped[10] ^= 0x01;

        let a = digest_reader(Cursor::new(&original), DEFAULT_CHUNK_SIZE)?;
        let b = digest_reader(Cursor::new(&flipped), DEFAULT_CHUNK_SIZE)?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn test_chunk_size_does_not_change_digest() -> io::Result<()> {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let whole = digest_bytes(&data);

        for chunk_size in [0, 1, 7, 4096, DEFAULT_CHUNK_SIZE, 1 << 20] {
            assert_eq!(digest_reader(Cursor::new(&data), chunk_size)?, whole);
        }
        Ok(())
    }

    #[test]
    fn test_read_failure_is_reported() {
        let result = digest_reader(FailingReader { served: false }, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_digest_file_matches_bytes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, b"file content for digest test")?;

        assert_eq!(
            digest_file(&path, DEFAULT_CHUNK_SIZE)?,
            digest_bytes(b"file content for digest test")
        );
        Ok(())
    }

    #[test]
    fn test_digest_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = digest_file(&temp_dir.path().join("gone"), DEFAULT_CHUNK_SIZE).unwrap_err();
        assert!(matches!(err, AgentError::Hash { .. }));
    }
}
