//! sqlx-backed warehouse sessions.
//!
//! Each [`SqlxSession`] wraps a single-connection pool, so one session maps to
//! exactly one backend connection. Postgres sessions are tagged on connect
//! (`application_name`, `TimeZone`, role, search path and `snowwatch.*`
//! settings); SQLite sessions are opened read-only.

use crate::db::backend::{Backend, ConnectionParams, QueryParam, QUERY_TAG, Row, Session};
use crate::db::types::RowToJson;
use crate::error::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

/// Supported sqlx drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres,
    SQLite,
}

impl Driver {
    /// Detect the driver from a connection URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        match url.scheme().to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::SQLite => "sqlite",
        }
    }
}

/// Driver-specific single-connection pool.
#[derive(Debug, Clone)]
enum DbPool {
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    fn is_closed(&self) -> bool {
        match self {
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }
}

/// Backend that opens sessions through sqlx.
#[derive(Debug, Clone)]
pub struct SqlxBackend {
    base_url: Url,
    driver: Driver,
}

impl SqlxBackend {
    /// Create a backend for the given connection URL.
    ///
    /// Credentials and database missing from the URL are filled in from the
    /// connection parameters at connect time.
    pub fn new(base_url: Url) -> Result<Self, BackendError> {
        let driver = Driver::from_url(&base_url).ok_or_else(|| {
            BackendError::permanent(format!(
                "Unsupported backend scheme '{}': expected postgres:// or sqlite:",
                base_url.scheme()
            ))
        })?;
        Ok(Self { base_url, driver })
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Resolve the final connection URL for the given parameters.
    pub fn connection_url(&self, params: &ConnectionParams) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        if self.driver == Driver::SQLite {
            return Ok(url);
        }
        if url.username().is_empty() && !params.user.is_empty() {
            url.set_username(&params.user)
                .map_err(|_| BackendError::permanent("Backend URL cannot carry a username"))?;
        }
        if url.password().is_none() && !params.password.expose_secret().is_empty() {
            url.set_password(Some(params.password.expose_secret()))
                .map_err(|_| BackendError::permanent("Backend URL cannot carry a password"))?;
        }
        if (url.path().is_empty() || url.path() == "/") && !params.database.is_empty() {
            url.set_path(&format!("/{}", params.database));
        }
        Ok(url)
    }

    /// `set_config` pairs applied to every new Postgres connection.
    pub fn session_settings(params: &ConnectionParams) -> Vec<(String, String)> {
        let mut settings = Vec::new();
        for (key, value) in &params.session_tags {
            if key.eq_ignore_ascii_case("TIMEZONE") {
                settings.push(("TimeZone".to_string(), value.clone()));
            } else {
                settings.push((format!("snowwatch.{}", key.to_lowercase()), value.clone()));
            }
        }
        if !params.warehouse.is_empty() {
            settings.push(("snowwatch.warehouse".to_string(), params.warehouse.clone()));
        }
        if !params.schema.is_empty() {
            settings.push(("search_path".to_string(), quote_ident(&params.schema)));
        }
        if !params.role.is_empty() {
            settings.push(("role".to_string(), params.role.clone()));
        }
        settings
    }

    async fn connect_postgres(
        &self,
        params: &ConnectionParams,
        connect_timeout: Duration,
    ) -> Result<DbPool, BackendError> {
        let url = self.connection_url(params)?;
        let application_name = params.session_tag("QUERY_TAG").unwrap_or(QUERY_TAG);
        let options = PgConnectOptions::from_str(url.as_str())
            .map_err(|e| BackendError::permanent(format!("Invalid Postgres URL: {}", e)))?
            .application_name(application_name);

        let settings = Arc::new(Self::session_settings(params));
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(1)
            .acquire_timeout(connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                let settings = Arc::clone(&settings);
                Box::pin(async move {
                    for (name, value) in settings.iter() {
                        sqlx::query("SELECT set_config($1, $2, false)")
                            .bind(name)
                            .bind(value)
                            .execute(&mut *conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;
        Ok(DbPool::Postgres(pool))
    }

    async fn connect_sqlite(&self, connect_timeout: Duration) -> Result<DbPool, BackendError> {
        let options = SqliteConnectOptions::from_str(self.base_url.as_str())
            .map_err(|e| BackendError::permanent(format!("Invalid SQLite URL: {}", e)))?
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(0)
            .max_connections(1)
            .acquire_timeout(connect_timeout)
            .connect_with(options)
            .await?;
        Ok(DbPool::SQLite(pool))
    }
}

#[async_trait]
impl Backend for SqlxBackend {
    fn name(&self) -> &'static str {
        self.driver.name()
    }

    async fn connect(
        &self,
        params: &ConnectionParams,
        connect_timeout: Duration,
    ) -> Result<Arc<dyn Session>, BackendError> {
        let connecting = async {
            match self.driver {
                Driver::Postgres => self.connect_postgres(params, connect_timeout).await,
                Driver::SQLite => self.connect_sqlite(connect_timeout).await,
            }
        };
        let pool = match timeout(connect_timeout, connecting).await {
            Ok(result) => result?,
            Err(_) => return Err(BackendError::timeout("connect", connect_timeout)),
        };
        Ok(Arc::new(SqlxSession {
            pool,
            created_at: Utc::now(),
        }))
    }
}

/// One backend connection opened by [`SqlxBackend`].
#[derive(Debug)]
pub struct SqlxSession {
    pool: DbPool,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl Session for SqlxSession {
    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn placeholder(&self, position: usize) -> String {
        match self.pool {
            DbPool::Postgres(_) => format!("${}", position),
            DbPool::SQLite(_) => format!("?{}", position),
        }
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> Result<Vec<Row>, BackendError> {
        debug!(sql = %sql, params = params.len(), "Executing catalog query");
        match &self.pool {
            DbPool::Postgres(pool) => postgres::fetch_rows(pool, sql, params, query_timeout).await,
            DbPool::SQLite(pool) => sqlite::fetch_rows(pool, sql, params, query_timeout).await,
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Quote an identifier for use in a Postgres setting value.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// =============================================================================
// Driver-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::postgres::PgArguments;

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> Result<Vec<Row>, BackendError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = query
            .fetch(pool)
            .map_ok(|row| row.to_json_row())
            .try_collect::<Vec<_>>();
        match timeout(query_timeout, rows).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(BackendError::from(e)),
            Err(_) => Err(BackendError::timeout("query execution", query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
        match param {
            QueryParam::Text(v) => query.bind(v.as_str()),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Timestamp(v) => query.bind(*v),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteArguments;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> Result<Vec<Row>, BackendError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = query
            .fetch(pool)
            .map_ok(|row| row.to_json_row())
            .try_collect::<Vec<_>>();
        match timeout(query_timeout, rows).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(BackendError::from(e)),
            Err(_) => Err(BackendError::timeout("query execution", query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
        match param {
            QueryParam::Text(v) => query.bind(v.as_str()),
            QueryParam::Int(v) => query.bind(*v),
            // Stored as RFC 3339 text so lexical comparison matches time order
            QueryParam::Timestamp(v) => query.bind(v.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn params() -> ConnectionParams {
        ConnectionParams::new(
            "warehouse.internal:5432",
            "auditor",
            SecretString::from("s3cret".to_string()),
            "watchdog",
            "COMPUTE_WH",
            "auditor_role",
            "main",
        )
    }

    #[test]
    fn test_driver_from_url() {
        let pg = Url::parse("postgres://host/db").unwrap();
        let lite = Url::parse("sqlite:data.db").unwrap();
        let other = Url::parse("mysql://host/db").unwrap();
        assert_eq!(Driver::from_url(&pg), Some(Driver::Postgres));
        assert_eq!(Driver::from_url(&lite), Some(Driver::SQLite));
        assert_eq!(Driver::from_url(&other), None);
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let err = SqlxBackend::new(Url::parse("mysql://host/db").unwrap()).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_connection_url_fills_credentials_and_database() {
        let backend = SqlxBackend::new(Url::parse("postgres://warehouse.internal:5432").unwrap())
            .unwrap();
        let url = backend.connection_url(&params()).unwrap();
        assert_eq!(url.username(), "auditor");
        assert_eq!(url.password(), Some("s3cret"));
        assert_eq!(url.path(), "/watchdog");
    }

    #[test]
    fn test_connection_url_keeps_explicit_values() {
        let backend =
            SqlxBackend::new(Url::parse("postgres://ops:pw@host:5432/other").unwrap()).unwrap();
        let url = backend.connection_url(&params()).unwrap();
        assert_eq!(url.username(), "ops");
        assert_eq!(url.password(), Some("pw"));
        assert_eq!(url.path(), "/other");
    }

    #[test]
    fn test_session_settings() {
        let settings = SqlxBackend::session_settings(&params());
        assert!(settings.contains(&("TimeZone".to_string(), "UTC".to_string())));
        assert!(settings.contains(&("snowwatch.query_tag".to_string(), "snowwatch".to_string())));
        assert!(settings.contains(&("snowwatch.warehouse".to_string(), "COMPUTE_WH".to_string())));
        assert!(settings.contains(&("search_path".to_string(), "\"main\"".to_string())));
        assert!(settings.contains(&("role".to_string(), "auditor_role".to_string())));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("ma\"in"), "\"ma\"\"in\"");
    }
}
