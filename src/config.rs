//! Configuration handling for Snowwatch.
//!
//! Configuration comes from CLI arguments with environment variable
//! fallbacks. Warehouse identifiers use the `SNOWFLAKE_*` variables, tuning
//! knobs use `SNOWWATCH_*`.

use crate::db::{ConnectionParams, RetryPolicy};
use crate::error::{WatchError, WatchResult};
use crate::metadata::CatalogQueries;
use crate::metadata::queries::default_keywords;
use crate::models::Severity;
use crate::rules::access::DEFAULT_PRIVILEGE_THRESHOLD;
use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_ACTIVITY_WINDOW_HOURS: u64 = 24;
pub const DEFAULT_NOTIFY_MIN_SEVERITY: &str = "high";

/// Configuration for Snowwatch.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "snowwatch",
    about = "Insider-threat auditing for data warehouses",
    version,
    author
)]
pub struct Config {
    /// Warehouse account identifier
    #[arg(long, env = "SNOWFLAKE_ACCOUNT", default_value = "")]
    pub account: String,

    /// Warehouse user
    #[arg(long, env = "SNOWFLAKE_USER", default_value = "")]
    pub user: String,

    /// Warehouse password (never logged)
    #[arg(
        long,
        env = "SNOWFLAKE_PASSWORD",
        hide_env_values = true,
        default_value = "",
        value_parser = parse_secret
    )]
    pub password: SecretString,

    #[arg(long, env = "SNOWFLAKE_DATABASE", default_value = "")]
    pub database: String,

    #[arg(long, env = "SNOWFLAKE_WAREHOUSE", default_value = "")]
    pub warehouse: String,

    #[arg(long, env = "SNOWFLAKE_ROLE", default_value = "")]
    pub role: String,

    #[arg(long, env = "SNOWFLAKE_SCHEMA", default_value = "")]
    pub schema: String,

    /// Backend connection URL (postgres:// or sqlite:). Derived from the
    /// account and database when omitted.
    #[arg(long, value_name = "URL", env = "SNOWWATCH_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Incoming webhook for alert notifications; notifications are disabled
    /// when unset
    #[arg(long, value_name = "URL", env = "SLACK_WEBHOOK_URL")]
    pub slack_webhook_url: Option<String>,

    /// Minimum alert severity forwarded to the webhook
    #[arg(
        long,
        default_value = DEFAULT_NOTIFY_MIN_SEVERITY,
        env = "SNOWWATCH_NOTIFY_MIN_SEVERITY"
    )]
    pub notify_min_severity: String,

    /// JSON file overriding the catalog and activity query texts
    #[arg(long, value_name = "FILE", env = "SNOWWATCH_CATALOG_QUERIES")]
    pub catalog_queries: Option<PathBuf>,

    /// Comma-separated column name keywords marking sensitive data
    #[arg(
        long = "sensitive-keyword",
        value_name = "KEYWORD",
        env = "SNOWWATCH_SENSITIVE_KEYWORDS",
        value_delimiter = ','
    )]
    pub sensitive_keywords: Vec<String>,

    /// Correlate query activity with sensitive-table metadata
    #[arg(long, env = "SNOWWATCH_CORRELATE_METADATA")]
    pub correlate_metadata: bool,

    /// Distinct sensitive tables a grantee may access before an alert
    #[arg(
        long,
        default_value_t = DEFAULT_PRIVILEGE_THRESHOLD,
        env = "SNOWWATCH_PRIVILEGE_THRESHOLD"
    )]
    pub privilege_threshold: usize,

    /// Trailing window of query history to evaluate, in hours
    #[arg(
        long,
        default_value_t = DEFAULT_ACTIVITY_WINDOW_HOURS,
        env = "SNOWWATCH_ACTIVITY_WINDOW_HOURS"
    )]
    pub activity_window_hours: u64,

    /// Connection attempts before the backend is reported unavailable
    #[arg(
        long,
        default_value_t = DEFAULT_RETRY_ATTEMPTS,
        env = "SNOWWATCH_RETRY_ATTEMPTS"
    )]
    pub retry_attempts: u32,

    /// Base delay between connection attempts in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_RETRY_BASE_DELAY_MS,
        env = "SNOWWATCH_RETRY_BASE_DELAY_MS"
    )]
    pub retry_base_delay_ms: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "SNOWWATCH_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "SNOWWATCH_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Webhook delivery timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_DELIVERY_TIMEOUT_SECS,
        env = "SNOWWATCH_DELIVERY_TIMEOUT"
    )]
    pub delivery_timeout: u64,

    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "SNOWWATCH_HTTP_HOST")]
    pub http_host: String,

    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "SNOWWATCH_HTTP_PORT")]
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SNOWWATCH_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SNOWWATCH_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            account: String::new(),
            user: String::new(),
            password: SecretString::from(String::new()),
            database: String::new(),
            warehouse: String::new(),
            role: String::new(),
            schema: String::new(),
            backend_url: None,
            slack_webhook_url: None,
            notify_min_severity: DEFAULT_NOTIFY_MIN_SEVERITY.to_string(),
            catalog_queries: None,
            sensitive_keywords: Vec::new(),
            correlate_metadata: false,
            privilege_threshold: DEFAULT_PRIVILEGE_THRESHOLD,
            activity_window_hours: DEFAULT_ACTIVITY_WINDOW_HOURS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT_SECS,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Check required identifiers and tuning values.
    pub fn validate(&self) -> WatchResult<()> {
        let required = [
            ("SNOWFLAKE_ACCOUNT", self.account.as_str()),
            ("SNOWFLAKE_USER", self.user.as_str()),
            ("SNOWFLAKE_PASSWORD", self.password.expose_secret()),
            ("SNOWFLAKE_DATABASE", self.database.as_str()),
            ("SNOWFLAKE_WAREHOUSE", self.warehouse.as_str()),
            ("SNOWFLAKE_ROLE", self.role.as_str()),
            ("SNOWFLAKE_SCHEMA", self.schema.as_str()),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(WatchError::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.retry_attempts == 0 {
            return Err(WatchError::config("retry attempts must be greater than 0"));
        }
        if self.privilege_threshold == 0 {
            return Err(WatchError::config("privilege threshold must be greater than 0"));
        }
        if self.activity_window_hours == 0 {
            return Err(WatchError::config("activity window must be greater than 0"));
        }
        if self.connect_timeout == 0 || self.query_timeout == 0 || self.delivery_timeout == 0 {
            return Err(WatchError::config("timeouts must be greater than 0"));
        }

        self.notify_threshold()?;
        self.backend_url()?;
        self.webhook_url()?;
        self.catalog_queries()?;
        Ok(())
    }

    /// Connection parameters with the default session tags.
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams::new(
            self.account.trim(),
            self.user.trim(),
            self.password.clone(),
            self.database.trim(),
            self.warehouse.trim(),
            self.role.trim(),
            self.schema.trim(),
        )
    }

    /// The explicit backend URL, or `postgres://{account}/{database}`.
    pub fn backend_url(&self) -> WatchResult<Url> {
        let raw = match &self.backend_url {
            Some(url) => url.clone(),
            None => format!("postgres://{}/{}", self.account.trim(), self.database.trim()),
        };
        Url::parse(&raw).map_err(|e| WatchError::config(format!("Invalid backend URL: {}", e)))
    }

    pub fn webhook_url(&self) -> WatchResult<Option<Url>> {
        match self.slack_webhook_url.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Url::parse(raw)
                .map(Some)
                .map_err(|e| WatchError::config(format!("Invalid webhook URL: {}", e))),
        }
    }

    pub fn notify_threshold(&self) -> WatchResult<Severity> {
        self.notify_min_severity.parse()
    }

    /// Query texts from the override file, or the Snowflake defaults.
    pub fn catalog_queries(&self) -> WatchResult<CatalogQueries> {
        let Some(path) = &self.catalog_queries else {
            return Ok(CatalogQueries::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WatchError::config(format!(
                "Failed to read catalog queries {}: {}",
                path.display(),
                e
            ))
        })?;
        CatalogQueries::from_json(&raw)
    }

    /// Configured keywords, or the defaults when none are given.
    pub fn keywords(&self) -> Vec<String> {
        if self.sensitive_keywords.is_empty() {
            default_keywords()
        } else {
            self.sensitive_keywords.clone()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn activity_window(&self) -> Duration {
        Duration::from_secs(self.activity_window_hours * 60 * 60)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn delivery_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout)
    }
}

fn parse_secret(value: &str) -> Result<SecretString, std::convert::Infallible> {
    Ok(SecretString::from(value.to_string()))
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
