//! Rotation scheduler.
//!
//! Drives the identifier lifecycle: loads or creates the rotating key at
//! startup, rotates it when its epoch ends, and on every tick derives the
//! identifier for the current time, hands it to the radio and publishes it to
//! the [`CurrentIdentifier`] cell.
//!
//! A key is only made current after it has been persisted, so a crash can
//! never leave the device advertising identifiers derived from a key the
//! store has not seen.

use std::sync::Arc;
use std::time::Duration;

use coepi_core::{round_down, Clock, ProtocolConfig, RotatingKey, Timestamp};
use coepi_crypto::{generate_rotating_key, key_len, IdentifierEngine};
use coepi_radio::{Advertiser, CurrentIdentifier, IdentifierEmission};
use coepi_store::KeyStore;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::RotationError;
use crate::task::TaskHandle;

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No key loaded yet
    Uninitialized,
    /// Key loaded, ticks emit identifiers
    Active,
}

/// Owns the current rotating key and the identifier emission sequence.
pub struct RotationScheduler {
    config: ProtocolConfig,
    engine: IdentifierEngine,
    keys: Arc<dyn KeyStore>,
    advertiser: Arc<dyn Advertiser>,
    clock: Arc<dyn Clock>,
    current: Arc<CurrentIdentifier>,
    key: Option<RotatingKey>,
    seq: u64,
}

impl RotationScheduler {
    pub fn new(
        config: ProtocolConfig,
        keys: Arc<dyn KeyStore>,
        advertiser: Arc<dyn Advertiser>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: IdentifierEngine::new(&config),
            config,
            keys,
            advertiser,
            clock,
            current: Arc::new(CurrentIdentifier::new()),
            key: None,
            seq: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.key.is_some() {
            SchedulerState::Active
        } else {
            SchedulerState::Uninitialized
        }
    }

    /// Key currently used for derivation.
    pub fn current_key(&self) -> Option<&RotatingKey> {
        self.key.as_ref()
    }

    /// Shared current-identifier cell.
    pub fn current_identifier(&self) -> Arc<CurrentIdentifier> {
        Arc::clone(&self.current)
    }

    /// Load the most recent key, replacing it if it is missing, expired or
    /// sized for another identifier scheme, then emit the first identifier.
    pub fn start(&mut self) -> Result<IdentifierEmission, RotationError> {
        let now = self.clock.now_secs();
        let expected_len = key_len(self.config.identifier_scheme);

        let stored = self.keys.most_recent(1)?.into_iter().next();
        let key = match stored {
            Some(key) if key.bytes().len() != expected_len => {
                warn!(
                    epoch_start = key.epoch_start(),
                    stored_len = key.bytes().len(),
                    expected_len,
                    "Stored key does not fit the identifier scheme, replacing it"
                );
                self.supersede_key(now)?
            }
            Some(key) if !key.is_expired(now, self.config.key_lifetime_secs) => {
                info!(epoch_start = key.epoch_start(), "Resuming rotating key");
                key
            }
            Some(key) => {
                info!(
                    epoch_start = key.epoch_start(),
                    "Stored key expired, generating a new one"
                );
                self.persist_new_key(now)?
            }
            None => {
                info!("No stored key, generating the first one");
                self.persist_new_key(now)?
            }
        };
        self.key = Some(key);

        self.emit(now)
    }

    /// One rotation step: rotate the key if its epoch is over, then derive and
    /// publish the identifier for the current time.
    ///
    /// If rotation fails the stale key stays current, advertising is stopped
    /// and nothing is published for this tick.
    pub fn tick(&mut self) -> Result<IdentifierEmission, RotationError> {
        let now = self.clock.now_secs();

        if let Err(e) = self.rotate_if_expired(now) {
            if let Err(radio) = self.advertiser.stop_advertising() {
                warn!("Failed to stop advertising: {}", radio);
            }
            return Err(e);
        }

        self.emit(now)
    }

    fn rotate_if_expired(&mut self, now: Timestamp) -> Result<(), RotationError> {
        let key = self.key.as_ref().ok_or(RotationError::NotStarted)?;
        if !key.is_expired(now, self.config.key_lifetime_secs) {
            return Ok(());
        }

        let previous = key.epoch_start();
        let next = self.persist_new_key(now)?;
        info!(
            previous_epoch = previous,
            epoch_start = next.epoch_start(),
            "Rotated key"
        );
        self.key = Some(next);
        Ok(())
    }

    fn persist_new_key(&self, now: Timestamp) -> Result<RotatingKey, RotationError> {
        let epoch_start = round_down(now, self.config.key_lifetime_secs);
        let key = generate_rotating_key(self.config.identifier_scheme, epoch_start)?;
        self.keys.insert(&key)?;
        Ok(key)
    }

    fn supersede_key(&self, now: Timestamp) -> Result<RotatingKey, RotationError> {
        let epoch_start = round_down(now, self.config.key_lifetime_secs);
        let key = generate_rotating_key(self.config.identifier_scheme, epoch_start)?;
        self.keys.supersede(&key)?;
        Ok(key)
    }

    fn emit(&mut self, now: Timestamp) -> Result<IdentifierEmission, RotationError> {
        let key = self.key.as_ref().ok_or(RotationError::NotStarted)?;
        let identifier = self.engine.derive(key, now)?;

        if let Err(e) = self.advertiser.advertise(&identifier) {
            warn!(identifier = %identifier, "Radio rejected identifier: {}", e);
        }

        self.seq += 1;
        let emission = IdentifierEmission {
            seq: self.seq,
            identifier,
            rounded_at: self.engine.round(now),
            key_epoch_start: key.epoch_start(),
        };
        debug!(
            seq = emission.seq,
            rounded_at = emission.rounded_at,
            "Identifier emitted"
        );
        self.current.publish(emission.clone());

        Ok(emission)
    }

    /// Start the scheduler and run it on a tokio task, ticking once per
    /// identifier lifetime on identifier boundaries.
    ///
    /// Startup errors are returned here; errors from later ticks are logged
    /// and the loop keeps going.
    pub fn spawn(mut self) -> Result<RotationHandle, RotationError> {
        self.start()?;

        let current = self.current_identifier();
        let period = Duration::from_secs(self.config.identifier_lifetime_secs);
        let now = self.clock.now_secs();
        let until_boundary = self.engine.round(now) + self.config.identifier_lifetime_secs - now;

        let task = TaskHandle::spawn("rotation", move |mut shutdown| async move {
            let first = Instant::now() + Duration::from_secs(until_boundary);
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick() {
                            error!("Rotation tick failed: {}", e);
                        }
                    }
                }
            }

            if let Err(e) = self.advertiser.stop_advertising() {
                warn!("Failed to stop advertising: {}", e);
            }
            info!("Rotation scheduler stopped");
        });

        Ok(RotationHandle { current, task })
    }
}

/// Running rotation scheduler.
#[derive(Debug)]
pub struct RotationHandle {
    current: Arc<CurrentIdentifier>,
    task: TaskHandle,
}

impl RotationHandle {
    /// Latest emission.
    pub fn current(&self) -> Option<IdentifierEmission> {
        self.current.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<IdentifierEmission>> {
        self.current.subscribe()
    }

    /// Stop ticking and stop advertising.
    pub async fn stop(self) {
        self.task.stop().await;
    }
}
