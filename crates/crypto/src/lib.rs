//! Cryptographic primitives for the CoEpi identifier protocol.
//!
//! This crate derives the short-lived broadcast identifiers (CENs) from a
//! device's rotating key and generates fresh rotating keys.
//!
//! # Derivation
//!
//! An identifier is a pure function of `(key, rounded timestamp)`: the
//! timestamp is floored to a multiple of the identifier lifetime before it is
//! fed to the keyed construction. A sender calling [`IdentifierEngine::derive`]
//! twice inside one identifier epoch broadcasts the same bytes, and a verifier
//! holding the published key can regenerate exactly what the sender broadcast.
//!
//! # Supported Schemes
//!
//! - **blake3-mac** (default): keyed BLAKE3 over a domain tag and the 8-byte
//!   big-endian rounded timestamp, truncated to 16 bytes. 32-byte keys.
//! - **aes128-ecb**: AES-128 over the PKCS#7 padded 4-byte big-endian rounded
//!   timestamp, one block. 16-byte keys. Wire compatible with legacy clients.
//!
//! # Security Principles
//!
//! - Key material is never logged
//! - Keys come from the operating system RNG
//! - Rotating keys are zeroized on drop

pub mod error;
pub mod identifier;
pub mod keys;

pub use error::{CryptoError, CryptoResult};
pub use identifier::{IdentifierEngine, IDENTIFIER_LEN};
pub use keys::{generate_rotating_key, key_len};
