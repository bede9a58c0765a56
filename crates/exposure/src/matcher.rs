//! Exposure matching.
//!
//! For a published key, regenerate every identifier that key could have
//! produced during the trailing match window and look them up in the local
//! observation log in one bulk query.

use std::collections::HashSet;
use std::sync::Arc;

use coepi_core::{Identifier, MatchResult, ProtocolConfig, PublishedKey, Timestamp};
use coepi_crypto::{CryptoError, IdentifierEngine};
use coepi_store::IdentifierStore;
use tracing::{debug, warn};

use crate::error::MatchError;

/// Candidate identifiers for one key over the window.
#[derive(Debug, Default)]
pub struct CandidateSet {
    pub identifiers: HashSet<Identifier>,
    /// Timestamps tried, including skipped ones
    pub attempted: usize,
    /// Timestamps whose derivation failed
    pub skipped: usize,
}

#[derive(Clone)]
pub struct MatchEngine {
    engine: IdentifierEngine,
    window_secs: u64,
    identifiers: Arc<dyn IdentifierStore>,
}

impl MatchEngine {
    pub fn new(config: &ProtocolConfig, identifiers: Arc<dyn IdentifierStore>) -> Self {
        Self {
            engine: IdentifierEngine::new(config),
            window_secs: config.match_window_secs(),
            identifiers,
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Derive one candidate per identifier period in `[now - window, now]`.
    ///
    /// A failing timestamp is logged and skipped; the rest of the window is
    /// still covered. Fails only when every timestamp fails.
    pub fn candidates(&self, key: &[u8], now: Timestamp) -> Result<CandidateSet, CryptoError> {
        self.engine.check_key(key)?;

        let step = self.engine.identifier_lifetime_secs();
        let steps = self.window_secs / step;
        let mut set = CandidateSet::default();
        let mut last_error = None;

        for i in 0..=steps {
            let Some(timestamp) = now.checked_sub(i * step) else {
                break;
            };
            set.attempted += 1;

            match self.engine.derive_from_bytes(key, timestamp) {
                Ok(identifier) => {
                    set.identifiers.insert(identifier);
                }
                Err(e) => {
                    warn!(timestamp, "Skipping candidate: {}", e);
                    set.skipped += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if set.identifiers.is_empty() => Err(e),
            _ => Ok(set),
        }
    }

    /// Local observations produced by `published` within the window ending at `now`.
    pub fn match_key(
        &self,
        published: &PublishedKey,
        now: Timestamp,
    ) -> Result<MatchResult, MatchError> {
        let key = published.decode().map_err(CryptoError::from)?;
        let candidates = self.candidates(&key, now)?;

        let min_timestamp = now.saturating_sub(self.window_secs);
        let matched = self
            .identifiers
            .find_in_range(min_timestamp, now, &candidates.identifiers)?;

        debug!(
            candidates = candidates.attempted,
            skipped = candidates.skipped,
            matched = matched.len(),
            "Checked published key"
        );

        Ok(MatchResult {
            published_key: published.clone(),
            matched_identifiers: matched,
            candidates_checked: candidates.attempted,
            candidates_skipped: candidates.skipped,
        })
    }
}
