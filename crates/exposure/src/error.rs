//! Error types for rotation, matching and the exposure loops.
//!
//! Submission failures ([`SubmitError`]) and key-check failures
//! ([`ExposureError`]) are separate types so a failed submission can never be
//! read as "no exposure found".

use coepi_crypto::CryptoError;
use coepi_radio::RadioError;
use coepi_store::StorageError;
use thiserror::Error;

/// Remote report service failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("Transport error during {operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("Unexpected status {status} from {operation}")]
    Status { operation: &'static str, status: u16 },

    #[error("Failed to decode {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("Invalid service configuration: {0}")]
    Config(String),
}

/// Rotation scheduler errors.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Scheduler has not been started")]
    NotStarted,
}

/// Matching errors for one published key.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Key-check pass errors.
#[derive(Debug, Error)]
pub enum ExposureError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Report submission errors, returned to the caller for explicit retry.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Report was not delivered: {0}")]
    Network(#[from] NetworkError),

    #[error("Report was delivered but could not be cached: {0}")]
    Storage(#[from] StorageError),
}
