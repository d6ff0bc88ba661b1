use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// A chunk of file data for transfer.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: i64,
    /// Size of this chunk in bytes.
    pub size: usize,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Reads a file in fixed-size chunks with automatic SHA-256 checksums.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: i64,
    file_size: i64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (4 MiB) is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len() as i64;
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.file_size - self.offset;
        if remaining <= 0 {
            return Ok(None);
        }

        let read_size = std::cmp::min(remaining as usize, self.chunk_size);
        let mut buf = vec![0u8; read_size];
        let n = self.file.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);

        let checksum = checksum_bytes(&buf);
        let chunk = Chunk {
            offset: self.offset,
            size: n,
            data: buf,
            checksum,
        };
        self.offset += n as i64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> i64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> i64 {
        self.file_size - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64); // SHA-256 = 64 hex chars.
    }

    #[test]
    fn checksum_bytes_different_data() {
        let c1 = checksum_bytes(b"hello");
        let c2 = checksum_bytes(b"world");
        assert_ne!(c1, c2);
    }

    #[test]
    fn calculate_file_checksum_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let data = b"test content for checksum";
        let path = create_test_file(dir.path(), "test.bin", data);

        let file_cs = calculate_file_checksum(&path).unwrap();
        let mem_cs = checksum_bytes(data);
        assert_eq!(file_cs, mem_cs);
    }

    #[test]
    fn identical_files_same_checksum() {
        let dir = TempDir::new().unwrap();
        let a = create_test_file(dir.path(), "a.bin", b"same content");
        let b = create_test_file(dir.path(), "b.bin", b"same content");
        assert_eq!(
            calculate_file_checksum(&a).unwrap(),
            calculate_file_checksum(&b).unwrap()
        );
    }

    #[test]
    fn chunk_reader_reads_all() {
        let dir = TempDir::new().unwrap();
        let data = b"AABBCCDDEE"; // 10 bytes.
        let path = create_test_file(dir.path(), "test.bin", data);

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.remaining(), 10);

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.offset, 0);
        assert_eq!(c1.size, 4);
        assert_eq!(&c1.data, b"AABB");
        assert!(!c1.checksum.is_empty());
        assert_eq!(reader.remaining(), 6);

        let c2 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c2.offset, 4);
        assert_eq!(&c2.data, b"CCDD");

        let c3 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c3.offset, 8);
        assert_eq!(&c3.data, b"EE");

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn chunk_checksum_matches_data() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            assert_eq!(chunk.checksum, checksum_bytes(&chunk.data));
        }
    }

    #[test]
    fn chunk_reader_default_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"x");
        let reader = ChunkReader::new(&path, 0).unwrap();
        assert_eq!(reader.file_size(), 1);
    }

    #[test]
    fn chunk_reader_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn chunk_reader_missing_file() {
        let result = ChunkReader::new(Path::new("/nonexistent/file.bin"), 4);
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
