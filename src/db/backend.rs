//! Backend abstraction.
//!
//! The warehouse is treated as an opaque queryable service. A [`Backend`]
//! knows how to open a [`Session`]; a session runs read-only queries and
//! returns rows as JSON objects keyed by lower-cased column name.

use crate::error::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

/// A result row keyed by lower-cased column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Query tag attached to every session this tool opens.
pub const QUERY_TAG: &str = "snowwatch";

/// Session timezone; rule evaluation assumes timestamps in this zone.
pub const SESSION_TIMEZONE: &str = "UTC";

/// Parameter bound to a catalog query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

/// Everything needed to (re)open a session.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub account: String,
    pub user: String,
    /// Never logged
    pub password: SecretString,
    pub database: String,
    pub warehouse: String,
    pub role: String,
    pub schema: String,
    /// Session parameters identifying this tool, applied on connect
    pub session_tags: Vec<(String, String)>,
}

impl ConnectionParams {
    /// Create connection parameters with the default session tags.
    pub fn new(
        account: impl Into<String>,
        user: impl Into<String>,
        password: SecretString,
        database: impl Into<String>,
        warehouse: impl Into<String>,
        role: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            user: user.into(),
            password,
            database: database.into(),
            warehouse: warehouse.into(),
            role: role.into(),
            schema: schema.into(),
            session_tags: vec![
                ("QUERY_TAG".to_string(), QUERY_TAG.to_string()),
                ("TIMEZONE".to_string(), SESSION_TIMEZONE.to_string()),
            ],
        }
    }

    /// Add or replace a session tag.
    pub fn with_session_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.session_tags.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.session_tags.push((key, value)),
        }
        self
    }

    /// Look up a session tag value.
    pub fn session_tag(&self, key: &str) -> Option<&str> {
        self.session_tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One live logical connection to the backend.
#[async_trait]
pub trait Session: Send + Sync + std::fmt::Debug {
    /// Whether the session can no longer serve queries.
    fn is_closed(&self) -> bool;

    /// When the session was opened.
    fn created_at(&self) -> DateTime<Utc>;

    /// Bind placeholder for the 1-based parameter position.
    fn placeholder(&self, position: usize) -> String {
        let _ = position;
        "?".to_string()
    }

    /// Run a read-only query, bounded by `timeout`.
    async fn fetch(
        &self,
        sql: &str,
        params: &[QueryParam],
        timeout: Duration,
    ) -> Result<Vec<Row>, BackendError>;

    /// Release the underlying connection.
    async fn close(&self);
}

/// Factory for sessions.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Open a new session, bounded by `timeout`.
    async fn connect(
        &self,
        params: &ConnectionParams,
        timeout: Duration,
    ) -> Result<Arc<dyn Session>, BackendError>;
}
