//! HTTP API.
//!
//! Routes:
//! - `GET /` status banner
//! - `GET /insider-events` activity alerts
//! - `GET /access-risks` activity alerts plus privilege alerts; qualifying
//!   alerts are forwarded to the notifier in the background
//! - `GET /lineage/{column}` lineage edges touching a column

use crate::db::ConnectionManager;
use crate::error::{WatchError, WatchResult};
use crate::metadata::MetadataScanner;
use crate::models::{Alert, LineagePath, Severity};
use crate::notify::{Notifier, spawn_notifications};
use crate::rules::{AccessAnalyzer, ActivityMonitor};
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<ActivityMonitor>,
    pub scanner: Arc<MetadataScanner>,
    pub analyzer: AccessAnalyzer,
    pub notifier: Arc<dyn Notifier>,
    /// Minimum severity forwarded to the notifier
    pub notify_threshold: Severity,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/insider-events", get(insider_events))
        .route("/access-risks", get(access_risks))
        .route("/lineage/{column}", get(lineage))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Snowwatch running" }))
}

async fn insider_events(State(state): State<AppState>) -> WatchResult<Json<Vec<Alert>>> {
    let alerts = state.monitor.run().await.inspect_err(log_failure)?;
    Ok(Json(alerts))
}

async fn access_risks(State(state): State<AppState>) -> WatchResult<Json<Vec<Alert>>> {
    let context = state.scanner.load_context().await.inspect_err(log_failure)?;
    let mut alerts = state
        .monitor
        .run_with(Some(&context))
        .await
        .inspect_err(log_failure)?;
    alerts.extend(state.analyzer.excessive_privileges(&context));

    let queued = spawn_notifications(Arc::clone(&state.notifier), &alerts, state.notify_threshold);
    info!(
        alerts = alerts.len(),
        notifications = queued.len(),
        "Access risk review complete"
    );
    Ok(Json(alerts))
}

async fn lineage(
    State(state): State<AppState>,
    Path(column): Path<String>,
) -> WatchResult<Json<LineagePath>> {
    let path = state
        .scanner
        .lineage_for_column(&column)
        .await
        .inspect_err(log_failure)?;
    Ok(Json(path))
}

fn log_failure(err: &WatchError) {
    error!(error = %err, status = %err.status_code(), "Request failed");
}

/// HTTP server bound to a host and port.
pub struct HttpTransport {
    state: AppState,
    connection_manager: Arc<ConnectionManager>,
    host: String,
    port: u16,
}

impl HttpTransport {
    pub fn new(
        state: AppState,
        connection_manager: Arc<ConnectionManager>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            state,
            connection_manager,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serve until SIGINT/SIGTERM, then close the backend session.
    pub async fn run(&self) -> WatchResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            WatchError::config(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;
        info!(addr = %bind_addr, "HTTP API listening");

        // In-flight catalog queries are bounded by their own timeouts, but a
        // stuck client can still hold the server open
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        self.connection_manager.close().await;
                        return Err(WatchError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        if self.connection_manager.is_connected().await {
            info!("Closing backend session");
        }
        self.connection_manager.close().await;
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Backend, ConnectionParams, RetryPolicy, SqlxBackend};
    use crate::metadata::CatalogQueries;
    use crate::notify::NotificationDispatcher;
    use crate::rules::RuleEngine;
    use secrecy::SecretString;
    use url::Url;

    fn transport(host: &str, port: u16) -> HttpTransport {
        let backend: Arc<dyn Backend> =
            Arc::new(SqlxBackend::new(Url::parse("sqlite:unused.db").unwrap()).unwrap());
        let params = ConnectionParams::new(
            "acct",
            "user",
            SecretString::from("pw".to_string()),
            "DB",
            "WH",
            "ROLE",
            "PUBLIC",
        );
        let manager = Arc::new(ConnectionManager::new(backend, params, RetryPolicy::immediate(1)));
        let scanner = Arc::new(MetadataScanner::new(manager.clone(), CatalogQueries::default()));
        let monitor = ActivityMonitor::new(
            manager.clone(),
            RuleEngine::with_default_rules(),
            CatalogQueries::default(),
        );
        let state = AppState {
            monitor: Arc::new(monitor),
            scanner,
            analyzer: AccessAnalyzer::default(),
            notifier: Arc::new(NotificationDispatcher::new(None, Duration::from_secs(1)).unwrap()),
            notify_threshold: Severity::High,
        };
        HttpTransport::new(state, manager, host, port)
    }

    #[test]
    fn test_bind_addr() {
        assert_eq!(transport("127.0.0.1", 8000).bind_addr(), "127.0.0.1:8000");
        assert_eq!(transport("0.0.0.0", 9090).bind_addr(), "0.0.0.0:9090");
    }
}
