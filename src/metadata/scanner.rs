//! Catalog scans.
//!
//! Each scan acquires the shared session, runs one bounded query and maps
//! every row onto a typed record. A failing query or an undecodable row fails
//! the whole scan; partial results are never returned.

use crate::db::{ConnectionManager, QueryParam, Row};
use crate::error::{WatchError, WatchResult};
use crate::metadata::context::MetadataContext;
use crate::metadata::queries::CatalogQueries;
use crate::models::{GrantRecord, LineageEdge, LineagePath, SensitiveColumn};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the catalog queries against the managed session.
#[derive(Debug)]
pub struct MetadataScanner {
    manager: Arc<ConnectionManager>,
    queries: CatalogQueries,
    keywords: Vec<String>,
    query_timeout: Duration,
}

impl MetadataScanner {
    pub fn new(manager: Arc<ConnectionManager>, queries: CatalogQueries) -> Self {
        Self {
            manager,
            queries,
            keywords: crate::metadata::queries::default_keywords(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Keywords used by [`load_context`](Self::load_context).
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Columns whose name contains any keyword, case-insensitively.
    ///
    /// An empty keyword set yields an empty result without touching the
    /// backend.
    pub async fn scan_sensitive_columns(
        &self,
        keywords: &[String],
    ) -> WatchResult<Vec<SensitiveColumn>> {
        let normalized = crate::metadata::queries::normalize_keywords(keywords);
        if normalized.is_empty() {
            debug!("No sensitive keywords configured, skipping column scan");
            return Ok(Vec::new());
        }

        let session = self.manager.acquire().await?;
        let Some((sql, params)) = self
            .queries
            .render_sensitive_columns(&normalized, |n| session.placeholder(n))
        else {
            return Ok(Vec::new());
        };
        let rows = session
            .fetch(&sql, &params, self.query_timeout)
            .await
            .map_err(|e| WatchError::metadata_query_failed("sensitive_columns", e))?;
        let columns: Vec<SensitiveColumn> = decode_rows("sensitive_columns", rows)?;

        // LIKE treats '_' as a wildcard, so re-check with a literal match
        let columns: Vec<SensitiveColumn> = columns
            .into_iter()
            .filter(|c| {
                let name = c.column.to_lowercase();
                normalized.iter().any(|k| name.contains(k.as_str()))
            })
            .collect();
        debug!(count = columns.len(), "Sensitive column scan complete");
        Ok(columns)
    }

    /// Every table and view privilege grant, unfiltered.
    pub async fn scan_grants(&self) -> WatchResult<Vec<GrantRecord>> {
        let grants = self.run("grants", &self.queries.grants, &[]).await?;
        debug!(count = grants.len(), "Grant scan complete");
        Ok(grants)
    }

    /// Table-to-view column lineage.
    pub async fn scan_lineage(&self) -> WatchResult<Vec<LineageEdge>> {
        let edges = self.run("lineage", &self.queries.lineage, &[]).await?;
        debug!(count = edges.len(), "Lineage scan complete");
        Ok(edges)
    }

    /// Scan sensitive columns and grants and index them.
    ///
    /// Lineage is not part of the context; it needs account usage views that
    /// the correlation and privilege review do not.
    pub async fn load_context(&self) -> WatchResult<MetadataContext> {
        let columns = self.scan_sensitive_columns(&self.keywords).await?;
        let column_count = columns.len();
        let grants = self.scan_grants().await?;
        let grant_count = grants.len();
        let context = MetadataContext::new(columns, grants);
        info!(
            sensitive_columns = column_count,
            sensitive_tables = context.sensitive_table_count(),
            grants = grant_count,
            "Metadata context loaded"
        );
        Ok(context)
    }

    /// Lineage edges touching a single column.
    pub async fn lineage_for_column(&self, column: &str) -> WatchResult<LineagePath> {
        let edges = self.scan_lineage().await?;
        Ok(LineagePath::from_edges(column, &edges))
    }

    async fn run<T: DeserializeOwned>(
        &self,
        name: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> WatchResult<Vec<T>> {
        let session = self.manager.acquire().await?;
        let rows = session
            .fetch(sql, params, self.query_timeout)
            .await
            .map_err(|e| WatchError::metadata_query_failed(name, e))?;
        decode_rows(name, rows)
    }
}

fn decode_rows<T: DeserializeOwned>(name: &str, rows: Vec<Row>) -> WatchResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                WatchError::metadata_query_failed(name, format!("unexpected row shape: {}", e))
            })
        })
        .collect()
}
