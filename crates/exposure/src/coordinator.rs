//! Exposure coordinator.
//!
//! Runs the two background loops of a device:
//! - channel ingestion: observations from the radio are recorded verbatim
//! - key checks: published keys since the watermark are fetched, matched
//!   against local observations, and exposures are surfaced as
//!   [`ExposureAlert`]s on a broadcast channel
//!
//! Report submission is a separate call whose failure is returned to the
//! caller and never changes local state.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coepi_core::{
    Clock, NodeConfig, ObservedIdentifier, ProtocolConfig, PublishedKey, RotatingKey,
    SymptomReport, Timestamp, SECONDS_PER_DAY,
};
use coepi_radio::ObservationReceiver;
use coepi_store::{Database, IdentifierStore, KeyStore, ReportStore, StorageResult};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{ExposureError, NetworkError, SubmitError};
use crate::matcher::MatchEngine;
use crate::service::ReportService;
use crate::task::TaskHandle;

const ALERT_CHANNEL_CAPACITY: usize = 256;

/// The three stores the coordinator works against.
#[derive(Clone)]
pub struct Stores {
    pub keys: Arc<dyn KeyStore>,
    pub identifiers: Arc<dyn IdentifierStore>,
    pub reports: Arc<dyn ReportStore>,
}

impl Stores {
    /// SQLite-backed stores sharing one database.
    pub fn sqlite(db: &Database) -> Self {
        Self {
            keys: Arc::new(db.key_store()),
            identifiers: Arc::new(db.identifier_store()),
            reports: Arc::new(db.report_store()),
        }
    }
}

/// A published key that matched local observations.
#[derive(Debug, Clone, Serialize)]
pub struct ExposureAlert {
    pub published_key: PublishedKey,
    pub matched_identifiers: Vec<ObservedIdentifier>,
    /// Reports fetched for the key; empty if retrieval failed
    pub reports: Vec<SymptomReport>,
}

/// Summary of one key-check pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub keys_checked: usize,
    pub exposures: usize,
    pub reports_fetched: usize,
    pub match_failures: usize,
    pub fetch_failures: usize,
    /// Watermark after the pass
    pub watermark: Timestamp,
}

pub struct ExposureCoordinator {
    config: ProtocolConfig,
    service: Arc<dyn ReportService>,
    matcher: MatchEngine,
    stores: Stores,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    retention_secs: Option<u64>,
    watermark: AtomicU64,
    alerts: broadcast::Sender<ExposureAlert>,
}

impl ExposureCoordinator {
    /// The watermark starts at `now - window`, so the first pass covers the
    /// whole match window.
    pub fn new(
        config: ProtocolConfig,
        request_timeout: Duration,
        service: Arc<dyn ReportService>,
        stores: Stores,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        let initial = clock.now_secs().saturating_sub(config.match_window_secs());

        Self {
            matcher: MatchEngine::new(&config, Arc::clone(&stores.identifiers)),
            config,
            service,
            stores,
            clock,
            request_timeout,
            retention_secs: None,
            watermark: AtomicU64::new(initial),
            alerts,
        }
    }

    /// Build from node configuration.
    pub fn from_config(
        config: &NodeConfig,
        service: Arc<dyn ReportService>,
        stores: Stores,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let coordinator = Self::new(
            config.protocol.clone(),
            Duration::from_secs(config.service.request_timeout_secs),
            service,
            stores,
            clock,
        );
        match config.storage.observation_retention_days {
            Some(days) => coordinator.with_retention(days * SECONDS_PER_DAY),
            None => coordinator,
        }
    }

    /// Drop observations older than `retention_secs` after each key check.
    pub fn with_retention(mut self, retention_secs: u64) -> Self {
        self.retention_secs = Some(retention_secs);
        self
    }

    pub fn watermark(&self) -> Timestamp {
        self.watermark.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExposureAlert> {
        self.alerts.subscribe()
    }

    pub fn matcher(&self) -> &MatchEngine {
        &self.matcher
    }

    /// Record one observation exactly as the radio reported it.
    pub fn ingest(&self, observation: &ObservedIdentifier) -> StorageResult<()> {
        self.stores.identifiers.insert(observation)?;
        debug!(
            identifier = %observation.identifier,
            observed_at = observation.observed_at,
            "Observation recorded"
        );
        Ok(())
    }

    /// The `n` most recent rotating keys, newest first.
    pub fn recent_keys(&self, n: usize) -> StorageResult<Vec<RotatingKey>> {
        self.stores.keys.most_recent(n)
    }

    /// Build a self-authored report carrying the `key_count` most recent keys.
    pub fn compose_report(
        &self,
        payload: impl Into<String>,
        mime_type: impl Into<String>,
        key_count: usize,
    ) -> StorageResult<SymptomReport> {
        let keys = self.recent_keys(key_count)?;
        Ok(SymptomReport::self_authored(
            payload,
            mime_type,
            &keys,
            self.clock.now_secs(),
        ))
    }

    /// Send a report to the remote service.
    ///
    /// On network failure nothing is stored and the caller may retry with the
    /// same report. On success the report is cached locally.
    pub async fn submit(&self, report: &SymptomReport) -> Result<(), SubmitError> {
        if let Err(e) = self
            .with_timeout("submit_report", self.service.submit_report(report))
            .await
        {
            warn!(report_id = %report.id, "Report submission failed: {}", e);
            return Err(e.into());
        }

        self.stores.reports.insert(report)?;
        info!(
            report_id = %report.id,
            keys = report.associated_keys.len(),
            "Report submitted"
        );
        Ok(())
    }

    /// One pass of the key-check loop.
    ///
    /// Keys are matched independently: one bad key is counted and skipped.
    /// The watermark advances to the newest key seen even if some keys
    /// failed, and is left alone if the key list could not be fetched.
    pub async fn check_once(&self) -> Result<CheckOutcome, ExposureError> {
        let since = self.watermark();
        let keys = self
            .with_timeout(
                "published_keys_since",
                self.service.published_keys_since(since),
            )
            .await?;

        let now = self.clock.now_secs();
        let mut outcome = CheckOutcome {
            keys_checked: keys.len(),
            ..CheckOutcome::default()
        };
        let mut newest = since;

        for key in keys {
            newest = newest.max(key.published_at);

            let result = match self.matcher.match_key(&key, now) {
                Ok(result) => result,
                Err(e) => {
                    warn!(key = %key.value, "Failed to match published key: {}", e);
                    outcome.match_failures += 1;
                    continue;
                }
            };
            if !result.is_exposure() {
                continue;
            }

            outcome.exposures += 1;
            info!(
                matched = result.matched_identifiers.len(),
                published_at = key.published_at,
                "Exposure detected"
            );

            let reports = match self.fetch_reports(&key).await {
                Ok(reports) => reports,
                Err(e) => {
                    warn!(key = %key.value, "Failed to fetch reports: {}", e);
                    outcome.fetch_failures += 1;
                    Vec::new()
                }
            };
            outcome.reports_fetched += reports.len();

            // No receivers is fine; alerts are also reflected in the report cache.
            let _ = self.alerts.send(ExposureAlert {
                published_key: key,
                matched_identifiers: result.matched_identifiers,
                reports,
            });
        }

        self.advance_watermark(newest);
        outcome.watermark = self.watermark();

        if let Some(retention) = self.retention_secs {
            let cutoff = now.saturating_sub(retention);
            match self.stores.identifiers.prune_before(cutoff) {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, cutoff, "Pruned old observations"),
                Err(e) => warn!("Failed to prune observations: {}", e),
            }
        }

        Ok(outcome)
    }

    async fn fetch_reports(&self, key: &PublishedKey) -> Result<Vec<SymptomReport>, ExposureError> {
        let mut reports = self
            .with_timeout("reports_for_key", self.service.reports_for_key(&key.value))
            .await?;

        for report in &mut reports {
            report.is_self_authored = false;
            self.stores.reports.insert(report)?;
        }
        Ok(reports)
    }

    fn advance_watermark(&self, candidate: Timestamp) {
        let previous = self.watermark.fetch_max(candidate, Ordering::SeqCst);
        if candidate > previous {
            debug!(previous, watermark = candidate, "Watermark advanced");
        }
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, call: F) -> Result<T, NetworkError>
    where
        F: Future<Output = Result<T, NetworkError>>,
    {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| NetworkError::Timeout { operation })?
    }

    /// Drain the radio's observation stream into the identifier store.
    ///
    /// Ends when stopped or when the radio drops its sender.
    pub fn spawn_ingestion(self: &Arc<Self>, mut observations: ObservationReceiver) -> TaskHandle {
        let coordinator = Arc::clone(self);
        TaskHandle::spawn("ingestion", move |mut shutdown| async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    observation = observations.recv() => match observation {
                        Some(observation) => {
                            if let Err(e) = coordinator.ingest(&observation) {
                                error!("Failed to record observation: {}", e);
                            }
                        }
                        None => {
                            info!("Observation stream closed");
                            break;
                        }
                    },
                }
            }
            info!("Channel ingestion stopped");
        })
    }

    /// Run [`check_once`](Self::check_once) every `periodic_check_secs`,
    /// starting immediately.
    pub fn spawn_key_checks(self: &Arc<Self>) -> TaskHandle {
        let coordinator = Arc::clone(self);
        let period = Duration::from_secs(self.config.periodic_check_secs);

        TaskHandle::spawn("key-checks", move |mut shutdown| async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => match coordinator.check_once().await {
                        Ok(outcome) => info!(
                            keys = outcome.keys_checked,
                            exposures = outcome.exposures,
                            watermark = outcome.watermark,
                            "Key check complete"
                        ),
                        Err(e) => warn!("Key check failed: {}", e),
                    },
                }
            }
            info!("Key checks stopped");
        })
    }
}
