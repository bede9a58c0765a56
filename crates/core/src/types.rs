//! Protocol data model
//!
//! Keys, identifiers and reports exchanged between the rotation scheduler,
//! the local stores, the broadcast channel and the remote report service.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Seconds in one day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Floor `timestamp` to a multiple of `period`.
///
/// A zero period leaves the timestamp unchanged.
pub fn round_down(timestamp: Timestamp, period: u64) -> Timestamp {
    if period == 0 {
        return timestamp;
    }
    (timestamp / period) * period
}

/// Symmetric key valid for one key-lifetime window.
///
/// Key material is zeroized on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct RotatingKey {
    bytes: Vec<u8>,
    epoch_start: Timestamp,
}

impl RotatingKey {
    /// Wrap existing key material that became active at `epoch_start`.
    pub fn new(bytes: Vec<u8>, epoch_start: Timestamp) -> Self {
        Self { bytes, epoch_start }
    }

    /// Decode a base64 key string.
    pub fn from_encoded(encoded: &str, epoch_start: Timestamp) -> Result<Self> {
        Ok(Self::new(BASE64.decode(encoded.trim())?, epoch_start))
    }

    /// Raw key material.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Time at which this key became current.
    pub fn epoch_start(&self) -> Timestamp {
        self.epoch_start
    }

    /// Base64 form used on the wire and in report payloads.
    pub fn encoded(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Whether the key's lifetime has elapsed at `now`.
    pub fn is_expired(&self, now: Timestamp, key_lifetime_secs: u64) -> bool {
        round_down(now, key_lifetime_secs) > self.epoch_start
    }
}

impl fmt::Debug for RotatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingKey")
            .field("len", &self.bytes.len())
            .field("epoch_start", &self.epoch_start)
            .finish()
    }
}

/// Broadcast identifier (CEN).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(Vec<u8>);

impl Identifier {
    /// Wrap identifier bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex rendering for logs and displays.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Vec<u8>> for Identifier {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_hex())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Identifier received from a nearby device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedIdentifier {
    /// Identifier bytes as received
    pub identifier: Identifier,
    /// Local receipt time
    pub observed_at: Timestamp,
}

impl ObservedIdentifier {
    /// Record `identifier` as seen at `observed_at`.
    pub fn new(identifier: Identifier, observed_at: Timestamp) -> Self {
        Self {
            identifier,
            observed_at,
        }
    }
}

/// Key disclosed by a reporting device, as returned by the key-check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedKey {
    /// Base64 key string
    #[serde(rename = "key")]
    pub value: String,
    /// Server watermark used to page subsequent checks
    pub published_at: Timestamp,
}

impl PublishedKey {
    /// Create a published key entry.
    pub fn new(value: impl Into<String>, published_at: Timestamp) -> Self {
        Self {
            value: value.into(),
            published_at,
        }
    }

    /// Publish a local key, as a reporting device would.
    pub fn from_key(key: &RotatingKey, published_at: Timestamp) -> Self {
        Self::new(key.encoded(), published_at)
    }

    /// Decoded key material.
    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(self.value.trim())?)
    }
}

/// Symptom report with the reporting device's recent keys attached.
///
/// Field names on the wire follow the report service's JSON contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomReport {
    /// Report identifier
    pub id: String,
    /// Free-form report content
    #[serde(rename = "report")]
    pub payload: String,
    /// Declared MIME type of `payload`
    #[serde(rename = "reportMimeType")]
    pub mime_type: String,
    /// Encoded rotating keys of the reporting device
    #[serde(rename = "keys", default)]
    pub associated_keys: Vec<String>,
    /// True when this device authored the report
    #[serde(rename = "isUser", default)]
    pub is_self_authored: bool,
    /// Creation time
    #[serde(rename = "date")]
    pub created_at: Timestamp,
}

impl SymptomReport {
    /// Build a locally authored report carrying `keys`.
    pub fn self_authored(
        payload: impl Into<String>,
        mime_type: impl Into<String>,
        keys: &[RotatingKey],
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: payload.into(),
            mime_type: mime_type.into(),
            associated_keys: keys.iter().map(RotatingKey::encoded).collect(),
            is_self_authored: true,
            created_at,
        }
    }
}

/// Outcome of one matching pass for a published key.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Key that was checked
    pub published_key: PublishedKey,
    /// Local observations produced by that key, possibly empty
    pub matched_identifiers: Vec<ObservedIdentifier>,
    /// Candidate identifiers regenerated for the window
    pub candidates_checked: usize,
    /// Candidates whose derivation failed and were skipped
    pub candidates_skipped: usize,
}

impl MatchResult {
    /// True when at least one observation matched.
    pub fn is_exposure(&self) -> bool {
        !self.matched_identifiers.is_empty()
    }
}
