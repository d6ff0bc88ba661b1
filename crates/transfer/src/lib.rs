//! Chunked file reading with content checksums and rate tracking.
//!
//! The client side of the upload path: files are fingerprinted with
//! SHA-256 and read in fixed-size chunks, each carrying its own checksum
//! for per-chunk verification on the server.

mod chunked;
mod progress;
mod validation;

pub use chunked::{Chunk, ChunkReader, calculate_file_checksum, checksum_bytes};
pub use progress::SpeedCalculator;
pub use validation::validate_relative_path;

/// Default chunk size: 4 MiB.
///
/// Larger chunks reduce per-chunk overhead (SHA-256, ACKs, syscalls).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
