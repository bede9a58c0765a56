//! Live current-identifier cell.
//!
//! Single writer (the rotation scheduler), any number of readers. Readers
//! either poll [`CurrentIdentifier::get`] or subscribe and await changes.

use coepi_core::{Identifier, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// One published identifier value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierEmission {
    /// Emission counter, +1 per scheduler tick
    pub seq: u64,
    /// Broadcast value
    pub identifier: Identifier,
    /// Rounded timestamp the value was derived for
    pub rounded_at: Timestamp,
    /// Epoch start of the key that produced it
    pub key_epoch_start: Timestamp,
}

/// Owned current-value cell backed by a watch channel.
#[derive(Debug)]
pub struct CurrentIdentifier {
    tx: watch::Sender<Option<IdentifierEmission>>,
}

impl Default for CurrentIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrentIdentifier {
    /// Empty cell.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current value and notify subscribers.
    pub fn publish(&self, emission: IdentifierEmission) {
        self.tx.send_replace(Some(emission));
    }

    /// Current value, if one has been published.
    pub fn get(&self) -> Option<IdentifierEmission> {
        self.tx.borrow().clone()
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<IdentifierEmission>> {
        self.tx.subscribe()
    }
}
