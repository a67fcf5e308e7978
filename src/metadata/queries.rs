//! Catalog query texts.
//!
//! Every query the scanner and the activity monitor issue lives in
//! [`CatalogQueries`], so the same engine can target any backend exposing an
//! information schema. Two templates carry markers filled in per session:
//! `{filter}` in the sensitive-column query and `{cutoff}` in the activity
//! query.
//!
//! Overrides load from a JSON object with the same field names; fields left
//! out keep the Snowflake defaults.

use crate::db::QueryParam;
use crate::error::{WatchError, WatchResult};
use serde::{Deserialize, Serialize};

/// Keywords flagging a column as sensitive when none are configured.
pub const DEFAULT_SENSITIVE_KEYWORDS: &[&str] =
    &["email", "ssn", "dob", "phone", "passport", "credit_card"];

pub const FILTER_MARKER: &str = "{filter}";
pub const CUTOFF_MARKER: &str = "{cutoff}";

const SENSITIVE_COLUMNS_SQL: &str = "\
SELECT table_catalog, table_schema, table_name, column_name, data_type \
FROM information_schema.columns \
WHERE {filter}";

const GRANTS_SQL: &str = "\
SELECT grantee_name, granted_to, privilege, table_catalog, table_schema, table_name \
FROM information_schema.table_privileges";

const LINEAGE_SQL: &str = "\
SELECT d.referenced_object_name AS source_table, \
       d.referenced_column_name AS source_column, \
       d.object_name AS target_table, \
       d.column_name AS target_column \
FROM snowflake.account_usage.object_dependencies d \
JOIN snowflake.account_usage.access_history h ON d.object_id = h.object_id \
WHERE d.referenced_object_domain = 'TABLE' \
  AND d.object_domain = 'VIEW'";

const ACTIVITY_SQL: &str = "\
SELECT query_text, user_name, start_time \
FROM snowflake.account_usage.query_history \
WHERE start_time >= {cutoff}";

/// Query texts for the catalog and activity views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogQueries {
    /// Columns query; `{filter}` is replaced by the keyword predicate
    pub sensitive_columns: String,
    pub grants: String,
    pub lineage: String,
    /// Query history; `{cutoff}` is replaced by the window start placeholder
    pub activity: String,
}

impl Default for CatalogQueries {
    fn default() -> Self {
        Self {
            sensitive_columns: SENSITIVE_COLUMNS_SQL.to_string(),
            grants: GRANTS_SQL.to_string(),
            lineage: LINEAGE_SQL.to_string(),
            activity: ACTIVITY_SQL.to_string(),
        }
    }
}

impl CatalogQueries {
    /// Parse a JSON override.
    pub fn from_json(raw: &str) -> WatchResult<Self> {
        let queries: Self = serde_json::from_str(raw)
            .map_err(|e| WatchError::config(format!("Invalid catalog queries: {}", e)))?;
        queries.validate()?;
        Ok(queries)
    }

    /// Check that both templates still carry their markers.
    pub fn validate(&self) -> WatchResult<()> {
        let templates = [
            ("sensitive_columns", &self.sensitive_columns, FILTER_MARKER),
            ("activity", &self.activity, CUTOFF_MARKER),
        ];
        for (name, sql, marker) in templates {
            if !sql.contains(marker) {
                return Err(WatchError::config(format!(
                    "catalog query '{}' must contain {}",
                    name, marker
                )));
            }
        }
        Ok(())
    }

    /// Render the sensitive-column query for a keyword set.
    ///
    /// Produces one `LOWER(column_name) LIKE ?` term per keyword joined with
    /// OR. Returns `None` when there are no usable keywords.
    pub fn render_sensitive_columns(
        &self,
        keywords: &[String],
        placeholder: impl Fn(usize) -> String,
    ) -> Option<(String, Vec<QueryParam>)> {
        let keywords = normalize_keywords(keywords);
        if keywords.is_empty() {
            return None;
        }

        let mut terms = Vec::with_capacity(keywords.len());
        let mut params = Vec::with_capacity(keywords.len());
        for (idx, keyword) in keywords.iter().enumerate() {
            terms.push(format!("LOWER(column_name) LIKE {}", placeholder(idx + 1)));
            params.push(QueryParam::Text(format!("%{}%", keyword)));
        }
        let filter = format!("({})", terms.join(" OR "));
        Some((self.sensitive_columns.replace(FILTER_MARKER, &filter), params))
    }

    /// Render the activity query with the cutoff placeholder.
    pub fn render_activity(&self, placeholder: impl Fn(usize) -> String) -> String {
        self.activity.replace(CUTOFF_MARKER, &placeholder(1))
    }
}

/// Lower-case, trim, drop blanks and duplicates, keep first-seen order.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !out.contains(&keyword) {
            out.push(keyword);
        }
    }
    out
}

/// The default keyword set as owned strings.
pub fn default_keywords() -> Vec<String> {
    DEFAULT_SENSITIVE_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dollar(n: usize) -> String {
        format!("${}", n)
    }

    #[test]
    fn test_render_sensitive_columns() {
        let queries = CatalogQueries::default();
        let (sql, params) = queries
            .render_sensitive_columns(&["Email".to_string(), "ssn".to_string()], dollar)
            .unwrap();
        assert!(sql.contains("(LOWER(column_name) LIKE $1 OR LOWER(column_name) LIKE $2)"));
        assert!(!sql.contains(FILTER_MARKER));
        assert_eq!(
            params,
            vec![
                QueryParam::Text("%email%".to_string()),
                QueryParam::Text("%ssn%".to_string())
            ]
        );
    }

    #[test]
    fn test_render_sensitive_columns_empty_keywords() {
        let queries = CatalogQueries::default();
        assert!(queries.render_sensitive_columns(&[], dollar).is_none());
        assert!(queries
            .render_sensitive_columns(&["  ".to_string()], dollar)
            .is_none());
    }

    #[test]
    fn test_normalize_keywords_dedups() {
        let keywords = vec![
            "SSN".to_string(),
            " ssn ".to_string(),
            "phone".to_string(),
        ];
        assert_eq!(normalize_keywords(&keywords), vec!["ssn", "phone"]);
    }

    #[test]
    fn test_render_activity() {
        let sql = CatalogQueries::default().render_activity(|_| "?".to_string());
        assert!(sql.ends_with("start_time >= ?"));
        assert!(sql.contains("query_history"));
    }

    #[test]
    fn test_default_lineage_filters_domains() {
        let sql = CatalogQueries::default().lineage;
        assert!(sql.contains("referenced_object_domain = 'TABLE'"));
        assert!(sql.contains("object_domain = 'VIEW'"));
    }

    #[test]
    fn test_defaults_carry_markers() {
        assert!(CatalogQueries::default().validate().is_ok());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let queries = CatalogQueries::from_json(r#"{"grants": "SELECT 1"}"#).unwrap();
        assert_eq!(queries.grants, "SELECT 1");
        assert_eq!(queries.activity, CatalogQueries::default().activity);
    }

    #[test]
    fn test_override_without_marker_rejected() {
        let err = CatalogQueries::from_json(r#"{"activity": "SELECT * FROM history"}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("activity"));
        assert!(err.contains(CUTOFF_MARKER));

        let err = CatalogQueries::from_json(
            r#"{"sensitive_columns": "SELECT * FROM information_schema.columns"}"#,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains(FILTER_MARKER));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(CatalogQueries::from_json(r#"{"grant": "SELECT 1"}"#).is_err());
    }

    #[test]
    fn test_bundled_postgres_queries() {
        let raw = include_str!("../../catalog/postgres.json");
        let queries = CatalogQueries::from_json(raw).unwrap();
        assert!(queries.grants.contains("information_schema.table_privileges"));
        assert!(queries.activity.contains("pg_stat_activity"));
        let (sql, _) = queries
            .render_sensitive_columns(&["email".to_string()], dollar)
            .unwrap();
        assert!(sql.contains("LOWER(column_name) LIKE $1"));
    }

    #[test]
    fn test_default_keywords() {
        assert_eq!(default_keywords().len(), 6);
        assert!(default_keywords().contains(&"credit_card".to_string()));
    }
}
