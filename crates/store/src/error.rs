//! Storage error types

use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Key epoch must increase: latest {latest}, attempted {attempted}")]
    NonMonotonicEpoch { latest: u64, attempted: u64 },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
