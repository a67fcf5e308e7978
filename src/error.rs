//! Error types for Snowwatch.
//!
//! Two layers of errors live here:
//! - [`BackendError`] is produced at the backend seam and carries an explicit
//!   [`BackendErrorKind`] so the connection manager can tell transient faults
//!   from permanent ones.
//! - [`WatchError`] is what the detection components return to their callers
//!   and what the HTTP layer turns into a response.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Retry classification for backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Network or operational fault, worth another attempt.
    Transient,
    /// Authentication, configuration, syntax or decode problems.
    Permanent,
}

/// Failure reported by a backend implementation.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// A call that did not finish within its deadline.
    pub fn timeout(operation: &str, elapsed: std::time::Duration) -> Self {
        Self::transient(format!("{} exceeded {}ms", operation, elapsed.as_millis()))
    }

    pub fn is_transient(&self) -> bool {
        self.kind == BackendErrorKind::Transient
    }
}

/// Classify sqlx errors into transient and permanent faults.
impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => BackendError::transient(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => {
                BackendError::transient(format!("TLS error: {}", tls_err))
            }
            sqlx::Error::Protocol(msg) => {
                BackendError::transient(format!("Protocol error: {}", msg))
            }
            sqlx::Error::PoolTimedOut => BackendError::transient("Timed out acquiring connection"),
            sqlx::Error::PoolClosed => BackendError::transient("Connection pool is closed"),
            sqlx::Error::WorkerCrashed => BackendError::transient("Database worker crashed"),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                // SQLSTATE class 08 is "connection exception"
                let transient = code.as_deref().is_some_and(|c| c.starts_with("08"));
                let message = match code {
                    Some(code) => format!("{} (SQLSTATE: {})", db_err.message(), code),
                    None => db_err.message().to_string(),
                };
                if transient {
                    BackendError::transient(message)
                } else {
                    BackendError::permanent(message)
                }
            }
            sqlx::Error::Configuration(msg) => {
                BackendError::permanent(format!("Configuration error: {}", msg))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                BackendError::permanent(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                BackendError::permanent(format!("Decode error: {}", source))
            }
            other => BackendError::permanent(format!("Backend error: {}", other)),
        }
    }
}

/// Errors surfaced by the detection components.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Backend unavailable after {attempts} attempt(s): {cause}")]
    BackendUnavailable { attempts: u32, cause: BackendError },

    #[error("Metadata query '{query}' failed: {cause}")]
    MetadataQueryFailed { query: String, cause: String },

    #[error("Rule evaluation failed: {message}")]
    RuleEvaluationFailed { message: String },

    #[error("Notification delivery failed: {message}")]
    DeliveryFailed { message: String },

    #[error("Invalid severity '{value}': expected one of low, medium, high, critical")]
    InvalidSeverity { value: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WatchError {
    pub fn backend_unavailable(attempts: u32, cause: BackendError) -> Self {
        Self::BackendUnavailable { attempts, cause }
    }

    pub fn metadata_query_failed(query: impl Into<String>, cause: impl ToString) -> Self {
        Self::MetadataQueryFailed {
            query: query.into(),
            cause: cause.to_string(),
        }
    }

    pub fn rule_evaluation_failed(message: impl Into<String>) -> Self {
        Self::RuleEvaluationFailed {
            message: message.into(),
        }
    }

    pub fn delivery_failed(message: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            message: message.into(),
        }
    }

    pub fn invalid_severity(value: impl Into<String>) -> Self {
        Self::InvalidSeverity {
            value: value.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get a remediation hint for this error, if one applies.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::BackendUnavailable { .. } => {
                Some("Check warehouse reachability and credentials, then retry the request")
            }
            Self::MetadataQueryFailed { .. } => {
                Some("Verify the configured role can read the catalog and usage views")
            }
            Self::RuleEvaluationFailed { .. } => {
                Some("Verify the configured role can read the query history view")
            }
            Self::Config { .. } => Some("Check command line flags and environment variables"),
            _ => None,
        }
    }

    /// HTTP status used when the error reaches the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::MetadataQueryFailed { .. } | Self::RuleEvaluationFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::InvalidSeverity { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias for detection operations.
pub type WatchResult<T> = Result<T, WatchError>;

impl IntoResponse for WatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Some(suggestion) = self.suggestion() {
            body["suggestion"] = serde_json::Value::from(suggestion);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatchError::backend_unavailable(3, BackendError::transient("network down"));
        let msg = err.to_string();
        assert!(msg.contains("Backend unavailable"));
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("network down"));
    }

    #[test]
    fn test_backend_error_kinds() {
        assert!(BackendError::transient("blip").is_transient());
        assert!(!BackendError::permanent("bad password").is_transient());
        assert!(
            BackendError::timeout("connect", std::time::Duration::from_millis(50)).is_transient()
        );
    }

    #[test]
    fn test_sqlx_io_error_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = BackendError::from(sqlx::Error::Io(io));
        assert!(err.is_transient());
        assert!(err.message.contains("reset by peer"));
    }

    #[test]
    fn test_sqlx_pool_errors_are_transient() {
        assert!(BackendError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(BackendError::from(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn test_sqlx_configuration_error_is_permanent() {
        let err = BackendError::from(sqlx::Error::Configuration("bad url".into()));
        assert_eq!(err.kind, BackendErrorKind::Permanent);
    }

    #[test]
    fn test_sqlx_row_not_found_is_permanent() {
        assert!(!BackendError::from(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            WatchError::backend_unavailable(1, BackendError::transient("x")).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            WatchError::metadata_query_failed("grants", "boom").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            WatchError::rule_evaluation_failed("boom").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            WatchError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_suggestions() {
        assert!(WatchError::config("missing account").suggestion().is_some());
        assert!(WatchError::delivery_failed("timeout").suggestion().is_none());
    }

    #[test]
    fn test_into_response_status() {
        let response = WatchError::backend_unavailable(3, BackendError::transient("down"))
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
