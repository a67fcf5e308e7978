//! Catalog and activity records.
//!
//! These are the typed rows produced by the metadata scanner and the activity
//! fetch. Backends return loosely typed rows, so every field is decoded with
//! [`lenient_string`] which accepts strings, numbers, booleans and NULL.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A catalog column whose name matches a sensitive keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveColumn {
    #[serde(alias = "table_catalog", deserialize_with = "lenient_string")]
    pub catalog: String,
    #[serde(alias = "table_schema", deserialize_with = "lenient_string")]
    pub schema: String,
    #[serde(alias = "table_name", deserialize_with = "lenient_string")]
    pub table: String,
    #[serde(alias = "column_name", deserialize_with = "lenient_string")]
    pub column: String,
    #[serde(deserialize_with = "lenient_string")]
    pub data_type: String,
}

impl SensitiveColumn {
    /// Fully qualified `catalog.schema.table` name.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// Kind of principal a privilege is granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GrantedTo {
    User,
    Role,
}

impl GrantedTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Role => "ROLE",
        }
    }
}

/// One privilege held by a grantee on a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    #[serde(alias = "grantee", deserialize_with = "lenient_string")]
    pub grantee_name: String,
    #[serde(deserialize_with = "granted_to_ci")]
    pub granted_to: GrantedTo,
    #[serde(alias = "privilege_type", deserialize_with = "lenient_string")]
    pub privilege: String,
    #[serde(deserialize_with = "lenient_string")]
    pub table_catalog: String,
    #[serde(deserialize_with = "lenient_string")]
    pub table_schema: String,
    #[serde(deserialize_with = "lenient_string")]
    pub table_name: String,
}

/// Derivation from a referenced table column to a dependent object column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    #[serde(deserialize_with = "lenient_string")]
    pub source_table: String,
    #[serde(deserialize_with = "lenient_string")]
    pub source_column: String,
    #[serde(deserialize_with = "lenient_string")]
    pub target_table: String,
    #[serde(deserialize_with = "lenient_string")]
    pub target_column: String,
}

impl LineageEdge {
    /// Whether either end of this edge is the given column (case-insensitive).
    pub fn touches_column(&self, column: &str) -> bool {
        self.source_column.eq_ignore_ascii_case(column)
            || self.target_column.eq_ignore_ascii_case(column)
    }
}

/// Response body for a column lineage lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineagePath {
    pub column: String,
    pub path: Vec<LineageEdge>,
}

impl LineagePath {
    /// Edges touching `column`, sorted and deduplicated.
    pub fn from_edges(column: &str, edges: &[LineageEdge]) -> Self {
        let mut path: Vec<LineageEdge> = edges
            .iter()
            .filter(|edge| edge.touches_column(column))
            .cloned()
            .collect();
        path.sort();
        path.dedup();
        Self {
            column: column.to_string(),
            path,
        }
    }
}

/// A query-history row fed to the rule engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub query_text: String,
    #[serde(alias = "user_name", deserialize_with = "lenient_string")]
    pub user: String,
    /// Raw backend timestamp text; parsed at evaluation time.
    #[serde(alias = "start_time", deserialize_with = "lenient_string")]
    pub timestamp: String,
}

impl ActivityRecord {
    pub fn new(
        query_text: impl Into<String>,
        user: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            query_text: query_text.into(),
            user: user.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Parse the timestamp, keeping the offset reported by the backend.
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(&self.timestamp)
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse backend timestamp text.
///
/// RFC 3339 values keep their offset. Values without an offset are taken as
/// UTC, which is the timezone every session is opened with.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Convert a parsed timestamp into the UTC form stored on alerts.
pub fn to_utc(ts: DateTime<FixedOffset>) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

/// Decode any scalar JSON value as a string; NULL becomes the empty string.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar value, got {}",
            other
        ))),
    }
}

fn granted_to_ci<'de, D>(deserializer: D) -> Result<GrantedTo, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = lenient_string(deserializer)?;
    match raw.trim().to_ascii_uppercase().as_str() {
        "USER" => Ok(GrantedTo::User),
        "ROLE" => Ok(GrantedTo::Role),
        _ => Err(serde::de::Error::custom(format!(
            "unknown grantee kind '{}', expected USER or ROLE",
            raw
        ))),
    }
}
