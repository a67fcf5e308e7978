//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use snowwatch::BackendError;
use snowwatch::db::{
    Backend, ConnectionManager, ConnectionParams, QueryParam, RetryPolicy, Row, Session,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn params() -> ConnectionParams {
    ConnectionParams::new(
        "acme-xy123",
        "auditor",
        SecretString::from("hunter2".to_string()),
        "WATCHDOG",
        "COMPUTE_WH",
        "AUDITOR",
        "PUBLIC",
    )
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Canned catalog data, routed by a substring of the SQL text.
///
/// Later routes win, so `with_error` can override a route registered by
/// [`sample_catalog`].
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    routes: Vec<(String, Result<Vec<Row>, BackendError>)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, sql_fragment: &str, rows: Vec<Value>) -> Self {
        self.routes.push((
            sql_fragment.to_string(),
            Ok(rows.into_iter().map(row).collect()),
        ));
        self
    }

    pub fn with_error(mut self, sql_fragment: &str, error: BackendError) -> Self {
        self.routes.push((sql_fragment.to_string(), Err(error)));
        self
    }

    fn lookup(&self, sql: &str) -> Result<Vec<Row>, BackendError> {
        self.routes
            .iter()
            .rev()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Debug)]
pub struct FakeSession {
    closed: AtomicBool,
    created_at: DateTime<Utc>,
    catalog: Catalog,
    pub fetches: Mutex<Vec<(String, Vec<QueryParam>)>>,
}

#[async_trait]
impl Session for FakeSession {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[QueryParam],
        _timeout: Duration,
    ) -> Result<Vec<Row>, BackendError> {
        self.fetches
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.catalog.lookup(sql)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Backend whose connect outcome is scripted.
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub connects: AtomicU32,
    /// Transient failures before the first success
    pub transient_failures: u32,
    /// Fail every attempt transiently
    pub always_fail: bool,
    pub connect_delay: Duration,
    pub catalog: Catalog,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeBackend {
    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            catalog,
            ..Default::default()
        }
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Every SQL text run on any session, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .flat_map(|s| {
                s.fetches
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(sql, _)| sql.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn connect(
        &self,
        _params: &ConnectionParams,
        _timeout: Duration,
    ) -> Result<Arc<dyn Session>, BackendError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.always_fail || attempt <= self.transient_failures {
            return Err(BackendError::transient(format!(
                "network unreachable (attempt {attempt})"
            )));
        }
        let session = Arc::new(FakeSession {
            closed: AtomicBool::new(false),
            created_at: Utc::now(),
            catalog: self.catalog.clone(),
            fetches: Mutex::new(Vec::new()),
        });
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

pub fn manager(backend: Arc<FakeBackend>, attempts: u32) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        backend,
        params(),
        RetryPolicy::immediate(attempts),
    ))
}

/// Catalog with two sensitive tables, a broad role grant and night activity.
pub fn sample_catalog() -> Catalog {
    use serde_json::json;
    Catalog::new()
        .with_rows(
            "information_schema.columns",
            vec![
                json!({"table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "CUSTOMERS", "column_name": "EMAIL", "data_type": "TEXT"}),
                json!({"table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "CUSTOMERS", "column_name": "SSN", "data_type": "TEXT"}),
                json!({"table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "USERS", "column_name": "PHONE_NUMBER", "data_type": "TEXT"}),
                json!({"table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "PATIENTS", "column_name": "DOB", "data_type": "DATE"}),
            ],
        )
        .with_rows(
            "table_privileges",
            vec![
                json!({"grantee_name": "ANALYST", "granted_to": "ROLE", "privilege": "SELECT", "table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "CUSTOMERS"}),
                json!({"grantee_name": "ANALYST", "granted_to": "ROLE", "privilege": "SELECT", "table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "USERS"}),
                json!({"grantee_name": "ANALYST", "granted_to": "ROLE", "privilege": "SELECT", "table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "PATIENTS"}),
                json!({"grantee_name": "BOB", "granted_to": "USER", "privilege": "SELECT", "table_catalog": "WATCHDOG", "table_schema": "PUBLIC", "table_name": "ORDERS"}),
            ],
        )
        .with_rows(
            "object_dependencies",
            vec![
                json!({"source_table": "CUSTOMERS", "source_column": "EMAIL", "target_table": "CUSTOMER_CONTACTS", "target_column": "EMAIL"}),
                json!({"source_table": "USERS", "source_column": "PHONE_NUMBER", "target_table": "USER_DIRECTORY", "target_column": "PHONE"}),
            ],
        )
        .with_rows(
            "query_history",
            vec![
                json!({"query_text": "SELECT * FROM CUSTOMERS", "user_name": "alice", "start_time": "2024-01-01T03:00:00"}),
                json!({"query_text": "SELECT name FROM T WHERE id=1", "user_name": "bob", "start_time": "2024-01-01T10:00:00"}),
                json!({"query_text": "SELECT * FROM ORDERS", "user_name": "carol", "start_time": "2024-01-01T11:00:00"}),
            ],
        )
}
