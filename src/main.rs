//! Snowwatch - Main entry point.
//!
//! Serves the insider-threat audit API over HTTP.

use clap::Parser;
use snowwatch::config::Config;
use snowwatch::db::{ConnectionManager, SqlxBackend};
use snowwatch::metadata::MetadataScanner;
use snowwatch::notify::NotificationDispatcher;
use snowwatch::rules::{AccessAnalyzer, ActivityMonitor, RuleEngine};
use snowwatch::transport::{AppState, HttpTransport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        if let Some(suggestion) = e.suggestion() {
            eprintln!("{}", suggestion);
        }
        std::process::exit(1);
    }

    init_tracing(&config);

    info!(
        account = %config.account,
        database = %config.database,
        warehouse = %config.warehouse,
        "Starting Snowwatch v{}",
        env!("CARGO_PKG_VERSION")
    );

    let backend = SqlxBackend::new(config.backend_url()?)?;
    let queries = config.catalog_queries()?;
    info!(
        driver = backend.driver().name(),
        catalog_queries = ?config.catalog_queries,
        "Backend configured"
    );
    let connection_manager = Arc::new(
        ConnectionManager::new(
            Arc::new(backend),
            config.connection_params(),
            config.retry_policy(),
        )
        .with_connect_timeout(config.connect_timeout_duration()),
    );

    let scanner = Arc::new(
        MetadataScanner::new(connection_manager.clone(), queries.clone())
            .with_keywords(config.keywords())
            .with_query_timeout(config.query_timeout_duration()),
    );

    let mut monitor = ActivityMonitor::new(
        connection_manager.clone(),
        RuleEngine::with_default_rules(),
        queries,
    )
    .with_window(config.activity_window())
    .with_query_timeout(config.query_timeout_duration());
    if config.correlate_metadata {
        monitor = monitor.with_correlation(scanner.clone());
    }

    let dispatcher =
        NotificationDispatcher::new(config.webhook_url()?, config.delivery_timeout_duration())?;
    if !dispatcher.is_enabled() {
        info!("No webhook configured, alert notifications disabled");
    }

    let state = AppState {
        monitor: Arc::new(monitor),
        scanner,
        analyzer: AccessAnalyzer::new(config.privilege_threshold),
        notifier: Arc::new(dispatcher),
        notify_threshold: config.notify_threshold()?,
    };

    let transport = HttpTransport::new(
        state,
        connection_manager,
        &config.http_host,
        config.http_port,
    );
    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
