//! Error types for identifier derivation and key generation.

use thiserror::Error;

/// Cryptographic error types.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Timestamp {0} cannot be encoded by this scheme")]
    TimestampOutOfRange(u64),

    #[error("Invalid key encoding: {0}")]
    InvalidEncoding(#[from] coepi_core::Error),

    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
