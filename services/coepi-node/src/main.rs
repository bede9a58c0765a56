use anyhow::{bail, Context};
use coepi_core::{logging, Clock, NodeConfig, SystemClock};
use coepi_exposure::{ExposureCoordinator, HttpReportService, RotationScheduler, Stores};
use coepi_radio::{observation_channel, LoopbackRadio};
use coepi_store::Database;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;
const CONFIG_ENV: &str = "COEPI_CONFIG";

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[derive(Debug, Default)]
struct Args {
    version_json: bool,
    config: Option<PathBuf>,
    report: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    if args.version_json {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = load_config(args.config)?;
    logging::init_from_config(&config.logging);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db = Database::open(&config.storage.database_path).with_context(|| {
        format!(
            "opening database {}",
            config.storage.database_path.display()
        )
    })?;
    let stores = Stores::sqlite(&db);

    let service = Arc::new(HttpReportService::new(&config.service, Arc::clone(&clock))?);
    let coordinator = Arc::new(ExposureCoordinator::from_config(
        &config,
        service,
        stores.clone(),
        Arc::clone(&clock),
    ));

    if let Some(payload) = args.report {
        let report = coordinator.compose_report(
            payload,
            "text/plain",
            config.protocol.report_key_count(),
        )?;
        coordinator.submit(&report).await?;
        info!(report_id = %report.id, "Symptom report submitted");
        return Ok(());
    }

    info!(
        database = %config.storage.database_path.display(),
        service = %config.service.base_url,
        scheme = ?config.protocol.identifier_scheme,
        "coepi-node starting"
    );

    let (observations_tx, observations_rx) = observation_channel();
    let radio = Arc::new(LoopbackRadio::new(observations_tx));

    let rotation = RotationScheduler::new(
        config.protocol.clone(),
        Arc::clone(&stores.keys),
        radio,
        Arc::clone(&clock),
    )
    .spawn()
    .context("starting rotation scheduler")?;

    let ingestion = coordinator.spawn_ingestion(observations_rx);
    let checks = coordinator.spawn_key_checks();

    let mut alerts = coordinator.subscribe();
    let alert_log = tokio::spawn(async move {
        loop {
            match alerts.recv().await {
                Ok(alert) => warn!(
                    matched = alert.matched_identifiers.len(),
                    reports = alert.reports.len(),
                    published_at = alert.published_key.published_at,
                    "Possible exposure"
                ),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Exposure alerts dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown requested");

    rotation.stop().await;
    checks.stop().await;
    ingestion.stop().await;
    alert_log.abort();

    info!("coepi-node stopped");
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version-json" => parsed.version_json = true,
            "--config" => match args.next() {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => bail!("--config was provided without a path"),
            },
            "--report" => match args.next() {
                Some(payload) => parsed.report = Some(payload),
                None => bail!("--report was provided without a payload"),
            },
            other => bail!("unrecognized argument: {}", other),
        }
    }

    Ok(parsed)
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<NodeConfig> {
    let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    match path {
        Some(path) => NodeConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => {
            let config = NodeConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
