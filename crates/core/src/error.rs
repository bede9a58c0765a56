//! Core error types

use thiserror::Error;

/// Core error type for CoEpi
#[derive(Debug, Error)]
pub enum Error {
    /// Key string was not valid base64
    #[error("Invalid key encoding: {0}")]
    KeyEncoding(#[from] base64::DecodeError),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
