//! Engine error types

use thiserror::Error;

/// Engine error
#[derive(Error, Debug)]
pub enum EngineError {
    /// Offset or length not a multiple of the block size. Rejected before
    /// any storage access and never retried.
    #[error("{what} {value} is not a multiple of block size {block_size}")]
    Misaligned {
        what: &'static str,
        value: u64,
        block_size: usize,
    },

    /// Request reaches past the end of the device
    #[error("offset {offset} + length {length} exceeds device size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    /// Invalid configuration, fatal at startup
    #[error("configuration error: {0}")]
    Config(#[from] dedupio_common::ConfigError),

    /// Backing store failure
    #[error("store error: {0}")]
    Store(#[from] dedupio_store::StoreError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
