//! Radio collaborator contract and an in-process loopback radio.

use coepi_core::{Identifier, ObservedIdentifier, Timestamp};
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Radio errors
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("Radio channel closed")]
    ChannelClosed,

    #[error("Radio rejected command: {0}")]
    Rejected(String),
}

/// Sending half of the observation stream, held by the radio.
pub type ObservationSender = mpsc::UnboundedSender<ObservedIdentifier>;

/// Receiving half of the observation stream, drained by channel ingestion.
pub type ObservationReceiver = mpsc::UnboundedReceiver<ObservedIdentifier>;

/// Create the radio-to-core observation stream.
///
/// Unbounded: the core accepts every event the radio presents.
pub fn observation_channel() -> (ObservationSender, ObservationReceiver) {
    mpsc::unbounded_channel()
}

/// Commands the core issues to the radio.
pub trait Advertiser: Send + Sync {
    /// Stop advertising the previous identifier and start advertising `identifier`.
    ///
    /// Best effort: receivers may briefly see a gap or the old value.
    fn advertise(&self, identifier: &Identifier) -> Result<(), RadioError>;

    /// Stop advertising altogether.
    fn stop_advertising(&self) -> Result<(), RadioError>;
}

/// Advertised identifiers kept by [`LoopbackRadio::history`].
pub const LOOPBACK_HISTORY_LIMIT: usize = 64;

#[derive(Debug, Default)]
struct LoopbackState {
    advertising: Option<Identifier>,
    history: VecDeque<Identifier>,
}

/// In-process radio. Advertised values are recorded, and observations are
/// injected with [`LoopbackRadio::receive`] or by [`LoopbackRadio::hear`]ing
/// another loopback radio.
#[derive(Debug)]
pub struct LoopbackRadio {
    state: Mutex<LoopbackState>,
    observations: ObservationSender,
}

impl LoopbackRadio {
    /// Create a radio delivering observations on `observations`.
    pub fn new(observations: ObservationSender) -> Self {
        info!("Loopback radio ready");
        Self {
            state: Mutex::new(LoopbackState::default()),
            observations,
        }
    }

    /// Deliver an identifier heard at `observed_at` to the core.
    pub fn receive(&self, identifier: Identifier, observed_at: Timestamp) -> Result<(), RadioError> {
        debug!(identifier = %identifier, observed_at, "Identifier observed");
        self.observations
            .send(ObservedIdentifier::new(identifier, observed_at))
            .map_err(|_| RadioError::ChannelClosed)
    }

    /// Observe whatever `other` is currently advertising.
    ///
    /// Returns the identifier heard, if `other` was advertising.
    pub fn hear(
        &self,
        other: &LoopbackRadio,
        observed_at: Timestamp,
    ) -> Result<Option<Identifier>, RadioError> {
        match other.advertising() {
            Some(identifier) => {
                self.receive(identifier.clone(), observed_at)?;
                Ok(Some(identifier))
            }
            None => Ok(None),
        }
    }

    /// Identifier currently on air.
    pub fn advertising(&self) -> Option<Identifier> {
        self.state.lock().ok().and_then(|s| s.advertising.clone())
    }

    /// The last [`LOOPBACK_HISTORY_LIMIT`] identifiers advertised, oldest first.
    pub fn history(&self) -> Vec<Identifier> {
        self.state
            .lock()
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Advertiser for LoopbackRadio {
    fn advertise(&self, identifier: &Identifier) -> Result<(), RadioError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RadioError::Rejected("loopback state poisoned".to_string()))?;
        state.advertising = Some(identifier.clone());
        if state.history.len() == LOOPBACK_HISTORY_LIMIT {
            state.history.pop_front();
        }
        state.history.push_back(identifier.clone());
        Ok(())
    }

    fn stop_advertising(&self) -> Result<(), RadioError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RadioError::Rejected("loopback state poisoned".to_string()))?;
        state.advertising = None;
        Ok(())
    }
}
