//! Rotating identifier derivation.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use coepi_core::{round_down, Identifier, IdentifierScheme, ProtocolConfig, RotatingKey, Timestamp};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::key_len;

/// Length of a derived identifier in bytes, for every scheme.
pub const IDENTIFIER_LEN: usize = 16;

/// Domain separation tag for the MAC construction.
const MAC_DOMAIN: &[u8] = b"coepi.cen.v1";

/// AES block size; the 4-byte timestamp is padded up to one block.
const AES_BLOCK_LEN: usize = 16;

/// Derives broadcast identifiers from a rotating key and a timestamp.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierEngine {
    scheme: IdentifierScheme,
    identifier_lifetime_secs: u64,
}

impl IdentifierEngine {
    /// Build an engine from the protocol configuration.
    pub fn new(config: &ProtocolConfig) -> Self {
        Self::with_scheme(config.identifier_scheme, config.identifier_lifetime_secs)
    }

    /// Build an engine for an explicit scheme and identifier lifetime.
    pub fn with_scheme(scheme: IdentifierScheme, identifier_lifetime_secs: u64) -> Self {
        Self {
            scheme,
            identifier_lifetime_secs,
        }
    }

    /// Derivation scheme in use.
    pub fn scheme(&self) -> IdentifierScheme {
        self.scheme
    }

    /// Identifier lifetime in seconds.
    pub fn identifier_lifetime_secs(&self) -> u64 {
        self.identifier_lifetime_secs
    }

    /// Epoch rounding applied to every timestamp before derivation.
    pub fn round(&self, timestamp: Timestamp) -> Timestamp {
        round_down(timestamp, self.identifier_lifetime_secs)
    }

    /// Derive the identifier broadcast under `key` at `timestamp`.
    pub fn derive(&self, key: &RotatingKey, timestamp: Timestamp) -> CryptoResult<Identifier> {
        self.derive_from_bytes(key.bytes(), timestamp)
    }

    /// Derive from raw key material, as done for published keys.
    pub fn derive_from_bytes(&self, key: &[u8], timestamp: Timestamp) -> CryptoResult<Identifier> {
        self.check_key(key)?;
        let rounded = self.round(timestamp);

        let bytes = match self.scheme {
            IdentifierScheme::Blake3Mac => derive_mac(key, rounded)?,
            IdentifierScheme::Aes128Ecb => derive_aes(key, rounded)?,
        };

        Ok(Identifier::new(bytes))
    }

    /// Reject key material of the wrong length for this scheme.
    pub fn check_key(&self, key: &[u8]) -> CryptoResult<()> {
        let expected = key_len(self.scheme);
        if key.len() != expected {
            return Err(CryptoError::InvalidKeyLength {
                expected,
                actual: key.len(),
            });
        }
        Ok(())
    }
}

fn derive_mac(key: &[u8], rounded: Timestamp) -> CryptoResult<Vec<u8>> {
    let key: &[u8; blake3::KEY_LEN] =
        key.try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: blake3::KEY_LEN,
                actual: key.len(),
            })?;

    let mut hasher = blake3::Hasher::new_keyed(key);
    hasher.update(MAC_DOMAIN);
    hasher.update(&rounded.to_be_bytes());
    let hash = hasher.finalize();

    Ok(hash.as_bytes()[..IDENTIFIER_LEN].to_vec())
}

fn derive_aes(key: &[u8], rounded: Timestamp) -> CryptoResult<Vec<u8>> {
    let cipher = Aes128::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 16,
        actual: key.len(),
    })?;

    let rounded = u32::try_from(rounded).map_err(|_| CryptoError::TimestampOutOfRange(rounded))?;

    // PKCS#7: 4 bytes of plaintext, 12 bytes of 0x0c
    let mut plaintext = [(AES_BLOCK_LEN - 4) as u8; AES_BLOCK_LEN];
    plaintext[..4].copy_from_slice(&rounded.to_be_bytes());

    let mut block = Block::from(plaintext);
    cipher.encrypt_block(&mut block);

    Ok(block.to_vec())
}
