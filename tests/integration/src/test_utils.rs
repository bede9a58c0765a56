//! Test utilities for integration tests

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use coepi_core::{
    Clock, ManualClock, ProtocolConfig, PublishedKey, ServiceConfig, SymptomReport, Timestamp,
    SECONDS_PER_DAY,
};
use coepi_exposure::{
    ExposureCoordinator, HttpReportService, NetworkError, ReportService, RotationScheduler,
    Stores,
};
use coepi_radio::{observation_channel, LoopbackRadio, ObservationReceiver};
use coepi_store::Database;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Start of simulated time, far from zero so match windows never clip.
pub const T0: Timestamp = 400 * SECONDS_PER_DAY;

/// Short lifetimes so tests can cross several rotations.
pub fn fast_protocol() -> ProtocolConfig {
    ProtocolConfig {
        key_lifetime_secs: 3_600,
        identifier_lifetime_secs: 60,
        match_window_days: 1,
        periodic_check_secs: 60,
        ..ProtocolConfig::default()
    }
}

/// SQLite database in the temp dir, removed on drop
pub struct TempDatabase {
    pub db: Database,
    path: PathBuf,
}

impl TempDatabase {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("coepi-test-{}.db", uuid::Uuid::new_v4()));
        let db = Database::open(&path).unwrap();
        Self { db, path }
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    /// Open a second handle on the same file.
    pub fn reopen(&self) -> Database {
        Database::open(&self.path).unwrap()
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

/// Shared state of the mock report service
pub struct MockState {
    clock: Arc<ManualClock>,
    pub reports: Mutex<Vec<SymptomReport>>,
    pub published: Mutex<Vec<PublishedKey>>,
    /// Number of upcoming submissions to reject with 503
    pub fail_submissions: AtomicUsize,
    /// Answer key checks with bare strings instead of stamped objects
    pub plain_keys: AtomicBool,
}

/// In-process HTTP report service
pub struct MockReportServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockReportServer {
    /// Start on an ephemeral port. Submitted keys are published at `clock`'s time.
    pub async fn start(clock: Arc<ManualClock>) -> Self {
        let state = Arc::new(MockState {
            clock,
            reports: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            fail_submissions: AtomicUsize::new(0),
            plain_keys: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/cenreport", post(submit_report))
            .route("/cenreport/:key", get(reports_for_key))
            .route("/cenkeys/:since", get(keys_since))
            .with_state(Arc::clone(&state));

        let (addr, task) = serve(app).await;
        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            base_url: self.base_url(),
            request_timeout_secs: 5,
        }
    }

    pub fn report_count(&self) -> usize {
        self.state.reports.lock().unwrap().len()
    }
}

impl Drop for MockReportServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serve `app` on an ephemeral local port.
pub async fn serve(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, task)
}

async fn submit_report(
    State(state): State<Arc<MockState>>,
    Json(report): Json<SymptomReport>,
) -> StatusCode {
    if state.fail_submissions.load(Ordering::SeqCst) > 0 {
        state.fail_submissions.fetch_sub(1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    let now = state.clock.now_secs();
    state.published.lock().unwrap().extend(
        report
            .associated_keys
            .iter()
            .map(|key| PublishedKey::new(key.clone(), now)),
    );
    state.reports.lock().unwrap().push(report);
    StatusCode::OK
}

async fn keys_since(
    State(state): State<Arc<MockState>>,
    Path(since): Path<Timestamp>,
) -> Json<Value> {
    let keys: Vec<PublishedKey> = state
        .published
        .lock()
        .unwrap()
        .iter()
        .filter(|key| key.published_at > since)
        .cloned()
        .collect();

    if state.plain_keys.load(Ordering::SeqCst) {
        let values: Vec<&str> = keys.iter().map(|key| key.value.as_str()).collect();
        Json(json!(values))
    } else {
        Json(json!(keys))
    }
}

async fn reports_for_key(
    State(state): State<Arc<MockState>>,
    Path(key): Path<String>,
) -> Json<Vec<SymptomReport>> {
    let reports = state
        .reports
        .lock()
        .unwrap()
        .iter()
        .filter(|report| report.associated_keys.contains(&key))
        .cloned()
        .collect();
    Json(reports)
}

/// Report service that is never reachable
pub struct OfflineService;

fn offline(operation: &'static str) -> NetworkError {
    NetworkError::Transport {
        operation,
        message: "offline".to_string(),
    }
}

#[async_trait]
impl ReportService for OfflineService {
    async fn submit_report(&self, _report: &SymptomReport) -> Result<(), NetworkError> {
        Err(offline("submit_report"))
    }

    async fn published_keys_since(
        &self,
        _watermark: Timestamp,
    ) -> Result<Vec<PublishedKey>, NetworkError> {
        Err(offline("published_keys_since"))
    }

    async fn reports_for_key(&self, _key: &str) -> Result<Vec<SymptomReport>, NetworkError> {
        Err(offline("reports_for_key"))
    }
}

/// One simulated phone: its own database, radio, scheduler and coordinator,
/// sharing the world clock.
pub struct TestDevice {
    pub radio: Arc<LoopbackRadio>,
    pub stores: Stores,
    pub scheduler: RotationScheduler,
    pub coordinator: Arc<ExposureCoordinator>,
    observations: Option<ObservationReceiver>,
    pub storage: TempDatabase,
}

impl TestDevice {
    pub fn new(
        config: &ProtocolConfig,
        clock: Arc<ManualClock>,
        service: Arc<dyn ReportService>,
    ) -> Self {
        let storage = TempDatabase::new();
        let stores = Stores::sqlite(&storage.db);
        let (tx, rx) = observation_channel();
        let radio = Arc::new(LoopbackRadio::new(tx));

        let scheduler = RotationScheduler::new(
            config.clone(),
            Arc::clone(&stores.keys),
            radio.clone(),
            clock.clone(),
        );
        let coordinator = Arc::new(ExposureCoordinator::new(
            config.clone(),
            Duration::from_secs(5),
            service,
            stores.clone(),
            clock,
        ));

        Self {
            radio,
            stores,
            scheduler,
            coordinator,
            observations: Some(rx),
            storage,
        }
    }

    /// Device talking to `server` over HTTP.
    pub fn with_server(
        config: &ProtocolConfig,
        clock: Arc<ManualClock>,
        server: &MockReportServer,
    ) -> Self {
        let service = HttpReportService::new(&server.service_config(), clock.clone()).unwrap();
        Self::new(config, clock, Arc::new(service))
    }

    /// Hand the observation stream to a spawned ingestion loop.
    pub fn take_observations(&mut self) -> ObservationReceiver {
        self.observations.take().expect("observations already taken")
    }

    /// Record everything the radio has heard so far. Returns the count.
    pub fn drain_observations(&mut self) -> usize {
        let rx = self.observations.as_mut().expect("observations taken");
        let mut drained = 0;
        while let Ok(observation) = rx.try_recv() {
            self.coordinator.ingest(&observation).unwrap();
            drained += 1;
        }
        drained
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
