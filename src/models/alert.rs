//! Alert data model.
//!
//! An [`Alert`] is the typed finding emitted by detection rules and analyzers.
//! Alerts are plain values: two alerts with equal fields are the same alert.

use crate::error::WatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Alert severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(WatchError::invalid_severity(s)),
        }
    }
}

/// A single detection finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Rule or analyzer tag, e.g. `FULL_TABLE_SCAN`
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: Severity,
    /// Subject of the finding (truncated query text, table or grantee name)
    pub object: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// Ordered so that serialized alerts are stable across runs
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    /// Create a new alert with empty metadata.
    pub fn new(
        alert_type: impl Into<String>,
        severity: Severity,
        object: impl Into<String>,
        user: impl Into<String>,
        timestamp: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            alert_type: alert_type.into(),
            severity,
            object: object.into(),
            user: user.into(),
            timestamp,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this alert is at or above the given severity.
    pub fn is_at_least(&self, severity: Severity) -> bool {
        self.severity >= severity
    }
}
