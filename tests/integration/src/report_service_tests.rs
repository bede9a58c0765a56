//! HTTP report service client against in-process servers.

use crate::test_utils::{serve, MockReportServer, OfflineService, TestDevice, T0};
use axum::routing::get;
use axum::Router;
use coepi_core::{ManualClock, ProtocolConfig, RotatingKey, ServiceConfig, SymptomReport};
use coepi_exposure::{HttpReportService, NetworkError, ReportService, SubmitError};
use coepi_store::ReportStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn client(base_url: String, request_timeout_secs: u64, now: u64) -> HttpReportService {
    let config = ServiceConfig {
        base_url,
        request_timeout_secs,
    };
    HttpReportService::new(&config, Arc::new(ManualClock::new(now))).unwrap()
}

fn report_with_key(bytes: Vec<u8>) -> SymptomReport {
    SymptomReport::self_authored(
        "headache",
        "text/plain",
        &[RotatingKey::new(bytes, 0)],
        T0,
    )
}

#[tokio::test]
async fn test_submit_then_fetch() {
    let server = MockReportServer::start(Arc::new(ManualClock::new(T0))).await;
    let svc = client(server.base_url(), 5, T0);
    let report = report_with_key(vec![7; 32]);

    svc.submit_report(&report).await.unwrap();

    let keys = svc.published_keys_since(0).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].value, report.associated_keys[0]);
    assert_eq!(keys[0].published_at, T0);

    let fetched = svc.reports_for_key(&keys[0].value).await.unwrap();
    assert_eq!(fetched, vec![report]);

    assert!(svc.published_keys_since(T0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plain_keys_take_request_time() {
    let server = MockReportServer::start(Arc::new(ManualClock::new(T0))).await;
    server.state.plain_keys.store(true, Ordering::SeqCst);
    let svc = client(server.base_url(), 5, T0 + 500);

    svc.submit_report(&report_with_key(vec![1; 32])).await.unwrap();

    let keys = svc.published_keys_since(0).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].published_at, T0 + 500);
}

#[tokio::test]
async fn test_key_with_path_characters() {
    let server = MockReportServer::start(Arc::new(ManualClock::new(T0))).await;
    let svc = client(server.base_url(), 5, T0);

    // All-ones bytes encode to a run of '/'.
    let report = report_with_key(vec![0xff; 32]);
    assert!(report.associated_keys[0].contains('/'));
    svc.submit_report(&report).await.unwrap();

    let fetched = svc
        .reports_for_key(&report.associated_keys[0])
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
}

#[tokio::test]
async fn test_rejected_submission_is_status_error() {
    let server = MockReportServer::start(Arc::new(ManualClock::new(T0))).await;
    server.state.fail_submissions.store(1, Ordering::SeqCst);
    let svc = client(server.base_url(), 5, T0);
    let report = report_with_key(vec![2; 32]);

    let result = svc.submit_report(&report).await;
    assert!(matches!(
        result,
        Err(NetworkError::Status { status: 503, .. })
    ));

    svc.submit_report(&report).await.unwrap();
    assert_eq!(server.report_count(), 1);
}

#[tokio::test]
async fn test_unreachable_service() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let svc = client(format!("http://{}/", addr), 5, T0);
    let result = svc.published_keys_since(0).await;
    assert!(matches!(result, Err(NetworkError::Transport { .. })));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let app = Router::new().route("/cenkeys/:since", get(|| async { "definitely not json" }));
    let (addr, task) = serve(app).await;

    let svc = client(format!("http://{}/", addr), 5, T0);
    let result = svc.published_keys_since(0).await;
    assert!(matches!(result, Err(NetworkError::Decode { .. })));

    task.abort();
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let app = Router::new().route(
        "/cenkeys/:since",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "[]"
        }),
    );
    let (addr, task) = serve(app).await;

    let svc = client(format!("http://{}/", addr), 1, T0);
    let result = svc.published_keys_since(0).await;
    assert!(matches!(result, Err(NetworkError::Timeout { .. })));

    task.abort();
}

#[tokio::test]
async fn test_coordinator_retry_after_rejection() {
    let clock = Arc::new(ManualClock::new(T0));
    let server = MockReportServer::start(clock.clone()).await;
    server.state.fail_submissions.store(1, Ordering::SeqCst);
    let mut device = TestDevice::with_server(&ProtocolConfig::default(), clock, &server);
    device.scheduler.start().unwrap();

    let report = device
        .coordinator
        .compose_report("fever", "text/plain", 2)
        .unwrap();

    let first = device.coordinator.submit(&report).await;
    assert!(matches!(first, Err(SubmitError::Network(_))));
    assert!(device.stores.reports.all().unwrap().is_empty());
    assert_eq!(server.report_count(), 0);

    device.coordinator.submit(&report).await.unwrap();
    assert_eq!(server.report_count(), 1);
    assert_eq!(device.stores.reports.all().unwrap(), vec![report]);
}

#[tokio::test]
async fn test_offline_check_keeps_watermark() {
    let clock = Arc::new(ManualClock::new(T0));
    let device = TestDevice::new(&ProtocolConfig::default(), clock, Arc::new(OfflineService));
    let before = device.coordinator.watermark();

    assert!(device.coordinator.check_once().await.is_err());
    assert_eq!(device.coordinator.watermark(), before);
}
