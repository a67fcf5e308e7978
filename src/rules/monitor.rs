//! Activity fetch and evaluation.

use crate::db::{ConnectionManager, QueryParam};
use crate::error::{WatchError, WatchResult};
use crate::metadata::{CatalogQueries, MetadataContext, MetadataScanner};
use crate::models::{ActivityRecord, Alert};
use crate::rules::RuleEngine;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ACTIVITY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Pulls recent query history and runs the rule engine over it.
#[derive(Debug)]
pub struct ActivityMonitor {
    manager: Arc<ConnectionManager>,
    engine: RuleEngine,
    /// Set when metadata correlation is enabled
    scanner: Option<Arc<MetadataScanner>>,
    queries: CatalogQueries,
    window: Duration,
    query_timeout: Duration,
}

impl ActivityMonitor {
    pub fn new(
        manager: Arc<ConnectionManager>,
        engine: RuleEngine,
        queries: CatalogQueries,
    ) -> Self {
        Self {
            manager,
            engine,
            scanner: None,
            queries,
            window: DEFAULT_ACTIVITY_WINDOW,
            query_timeout: crate::metadata::scanner::DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Correlate activity with catalog metadata loaded through `scanner`.
    pub fn with_correlation(mut self, scanner: Arc<MetadataScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Trailing window of history to evaluate.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn correlates(&self) -> bool {
        self.scanner.is_some()
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Query history within the trailing window, in backend order.
    pub async fn fetch_activity(&self) -> WatchResult<Vec<ActivityRecord>> {
        let window = TimeDelta::from_std(self.window)
            .map_err(|_| WatchError::config("activity window is out of range"))?;
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .ok_or_else(|| WatchError::config("activity window is out of range"))?;

        let session = self.manager.acquire().await?;
        let sql = self.queries.render_activity(|n| session.placeholder(n));
        let rows = session
            .fetch(&sql, &[QueryParam::Timestamp(cutoff)], self.query_timeout)
            .await
            .map_err(|e| WatchError::rule_evaluation_failed(format!("activity query: {}", e)))?;

        let records = rows
            .into_iter()
            .map(|row| {
                serde_json::from_value::<ActivityRecord>(serde_json::Value::Object(row)).map_err(
                    |e| WatchError::rule_evaluation_failed(format!("activity row: {}", e)),
                )
            })
            .collect::<WatchResult<Vec<_>>>()?;
        debug!(count = records.len(), cutoff = %cutoff, "Fetched activity records");
        Ok(records)
    }

    /// Fetch activity and evaluate it, loading metadata first when
    /// correlation is enabled.
    pub async fn run(&self) -> WatchResult<Vec<Alert>> {
        let context = match &self.scanner {
            Some(scanner) => Some(scanner.load_context().await?),
            None => None,
        };
        self.run_with(context.as_ref()).await
    }

    /// Fetch activity and evaluate it against an already loaded context.
    ///
    /// The context is ignored unless correlation is enabled.
    pub async fn run_with(&self, context: Option<&MetadataContext>) -> WatchResult<Vec<Alert>> {
        let records = self.fetch_activity().await?;
        let context = context.filter(|_| self.correlates());
        let alerts = self.engine.evaluate_with_context(&records, context);
        info!(
            records = records.len(),
            alerts = alerts.len(),
            correlated = context.is_some(),
            "Activity evaluated"
        );
        Ok(alerts)
    }
}
