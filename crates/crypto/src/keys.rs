//! Rotating key generation

use coepi_core::{IdentifierScheme, RotatingKey, Timestamp};
use tracing::debug;

use crate::error::{CryptoError, CryptoResult};

/// Key length in bytes required by `scheme`.
pub fn key_len(scheme: IdentifierScheme) -> usize {
    match scheme {
        IdentifierScheme::Blake3Mac => blake3::KEY_LEN,
        IdentifierScheme::Aes128Ecb => 16,
    }
}

/// Generate a fresh random key for `scheme`, active from `epoch_start`.
pub fn generate_rotating_key(
    scheme: IdentifierScheme,
    epoch_start: Timestamp,
) -> CryptoResult<RotatingKey> {
    let mut bytes = vec![0u8; key_len(scheme)];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;

    debug!(?scheme, epoch_start, "Generated rotating key");

    Ok(RotatingKey::new(bytes, epoch_start))
}
