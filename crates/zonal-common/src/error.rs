//! Error types for zonal.

use thiserror::Error;

/// Result type alias using ZonalError.
pub type Result<T> = std::result::Result<T, ZonalError>;

/// Errors that can occur in zonal operations.
#[derive(Debug, Error)]
pub enum ZonalError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Store errors
    #[error("block address out of range: {addr} (store size {size})")]
    BlockOutOfRange { addr: u64, size: u64 },

    #[error("block address not aligned: {addr} (block size {block_size})")]
    UnalignedBlock { addr: u64, block_size: u64 },

    // Index file errors
    #[error("index header mismatch: {field} expected {expected}, got {actual}")]
    HeaderMismatch {
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("invalid block kind tag: {0}")]
    InvalidBlockKind(u64),

    #[error("index corrupted: {0}")]
    Corrupt(String),

    // Argument errors
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: u64, actual: u64 },

    #[error("value size mismatch: expected {expected} bytes, got {actual}")]
    ValueSizeMismatch { expected: u64, actual: u64 },

    // Tree errors
    #[error("node full")]
    NodeFull,

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}
