//! HTTP API served on a local port.

mod common;

use async_trait::async_trait;
use common::{FakeBackend, manager, sample_catalog};
use reqwest::StatusCode;
use serde_json::Value;
use snowwatch::metadata::{CatalogQueries, MetadataScanner};
use snowwatch::models::{Alert, LineagePath, Severity};
use snowwatch::notify::{DeliveryStatus, Notifier};
use snowwatch::rules::{AccessAnalyzer, ActivityMonitor, RuleEngine};
use snowwatch::transport::{AppState, router};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<Alert>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> DeliveryStatus {
        self.seen.lock().unwrap().push(alert.clone());
        DeliveryStatus::Delivered
    }
}

struct TestServer {
    base: String,
    notifier: Arc<RecordingNotifier>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(backend: Arc<FakeBackend>, correlate: bool) -> Self {
        let manager = manager(backend, 3);
        let scanner = Arc::new(MetadataScanner::new(
            manager.clone(),
            CatalogQueries::default(),
        ));
        let mut monitor = ActivityMonitor::new(
            manager,
            RuleEngine::with_default_rules(),
            CatalogQueries::default(),
        );
        if correlate {
            monitor = monitor.with_correlation(scanner.clone());
        }
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState {
            monitor: Arc::new(monitor),
            scanner,
            analyzer: AccessAnalyzer::default(),
            notifier: notifier.clone(),
            notify_threshold: Severity::High,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            notifier,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }

    /// Wait for background notifications to land.
    async fn notified(&self, expected: usize) -> Vec<Alert> {
        for _ in 0..50 {
            let seen = self.notifier.seen.lock().unwrap().clone();
            if seen.len() >= expected {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.notifier.seen.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_root_banner() {
    let server = TestServer::start(Arc::new(FakeBackend::default()), false).await;
    let response = server.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Snowwatch running");
}

#[tokio::test]
async fn test_insider_events() {
    let backend = Arc::new(FakeBackend::with_catalog(sample_catalog()));
    let server = TestServer::start(backend, false).await;

    let response = server.get("/insider-events").await;
    assert_eq!(response.status(), StatusCode::OK);
    let alerts: Vec<Alert> = response.json().await.unwrap();
    let types: Vec<&str> = alerts.iter().map(|a| a.alert_type.as_str()).collect();
    assert_eq!(
        types,
        vec!["FULL_TABLE_SCAN", "OFF_HOURS_ACCESS", "FULL_TABLE_SCAN"]
    );
    // no notifications from this route
    assert!(server.notified(1).await.is_empty());
}

#[tokio::test]
async fn test_access_risks_appends_privileges_and_notifies() {
    let backend = Arc::new(FakeBackend::with_catalog(sample_catalog()));
    let server = TestServer::start(backend, false).await;

    let response = server.get("/access-risks").await;
    assert_eq!(response.status(), StatusCode::OK);
    let alerts: Vec<Alert> = response.json().await.unwrap();
    assert_eq!(alerts.len(), 4);
    let last = alerts.last().unwrap();
    assert_eq!(last.alert_type, "EXCESSIVE_PRIVILEGES");
    assert_eq!(last.severity, Severity::High);

    let notified = server.notified(1).await;
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].alert_type, "EXCESSIVE_PRIVILEGES");
}

#[tokio::test]
async fn test_access_risks_with_correlation() {
    let backend = Arc::new(FakeBackend::with_catalog(sample_catalog()));
    let server = TestServer::start(backend.clone(), true).await;

    let alerts: Vec<Alert> = server.get("/access-risks").await.json().await.unwrap();
    let scans: Vec<&Alert> = alerts
        .iter()
        .filter(|a| a.alert_type == "FULL_TABLE_SCAN")
        .collect();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].user, "alice");

    // catalog loaded once for both activity and privilege review
    let grant_scans = backend
        .executed_sql()
        .iter()
        .filter(|sql| sql.contains("table_privileges"))
        .count();
    assert_eq!(grant_scans, 1);
}

#[tokio::test]
async fn test_lineage_lookup() {
    let backend = Arc::new(FakeBackend::with_catalog(sample_catalog()));
    let server = TestServer::start(backend, false).await;

    let response = server.get("/lineage/email").await;
    assert_eq!(response.status(), StatusCode::OK);
    let path: LineagePath = response.json().await.unwrap();
    assert_eq!(path.column, "email");
    assert_eq!(path.path.len(), 1);

    let empty: LineagePath = server.get("/lineage/salary").await.json().await.unwrap();
    assert!(empty.path.is_empty());
}

#[tokio::test]
async fn test_backend_down_is_service_unavailable() {
    let backend = Arc::new(FakeBackend {
        always_fail: true,
        ..Default::default()
    });
    let server = TestServer::start(backend, false).await;

    let response = server.get("/insider-events").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Backend unavailable"));
    assert!(body["suggestion"].is_string());
}

#[tokio::test]
async fn test_catalog_failure_is_bad_gateway() {
    let catalog = sample_catalog().with_error(
        "object_dependencies",
        snowwatch::BackendError::permanent("object does not exist"),
    );
    let server = TestServer::start(Arc::new(FakeBackend::with_catalog(catalog)), false).await;

    let response = server.get("/lineage/email").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("object does not exist"));
}

#[tokio::test]
async fn test_access_risks_ignores_lineage_failure() {
    let catalog = sample_catalog().with_error(
        "object_dependencies",
        snowwatch::BackendError::permanent("insufficient privileges on account_usage"),
    );
    let backend = Arc::new(FakeBackend::with_catalog(catalog));
    let server = TestServer::start(backend.clone(), true).await;

    let response = server.get("/access-risks").await;
    assert_eq!(response.status(), StatusCode::OK);
    let alerts: Vec<Alert> = response.json().await.unwrap();
    assert_eq!(alerts.last().unwrap().alert_type, "EXCESSIVE_PRIVILEGES");
    assert!(!backend
        .executed_sql()
        .iter()
        .any(|sql| sql.contains("object_dependencies")));

    let lineage = server.get("/lineage/email").await;
    assert_eq!(lineage.status(), StatusCode::BAD_GATEWAY);
}
