//! Unfiltered table reads.

use crate::models::metadata::to_utc;
use crate::models::{ActivityRecord, Alert, Severity};
use crate::rules::{Rule, RuleContext, object_preview};

pub const FULL_TABLE_SCAN: &str = "FULL_TABLE_SCAN";

/// Flags queries that read from a table without a WHERE clause.
///
/// Matching is a case-insensitive substring test on `FROM` and `WHERE`, so
/// identifiers such as `WHEREAS` or `FROM_DATE` can cause false results.
///
/// With metadata correlation, only queries naming a sensitive table alert,
/// and the alert lists the tables and columns involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullScanRule;

impl Rule for FullScanRule {
    fn name(&self) -> &'static str {
        "full_table_scan"
    }

    fn evaluate(&self, record: &ActivityRecord, ctx: &RuleContext<'_>) -> Vec<Alert> {
        let upper = record.query_text.to_uppercase();
        if !upper.contains("FROM") || upper.contains("WHERE") {
            return Vec::new();
        }

        let alert = Alert::new(
            FULL_TABLE_SCAN,
            Severity::Medium,
            object_preview(&record.query_text),
            record.user.clone(),
            to_utc(ctx.timestamp),
            "Query without WHERE clause on PII table",
        );

        let Some(metadata) = ctx.metadata else {
            return vec![alert];
        };
        let tables = metadata.referenced_sensitive_tables(&record.query_text);
        if tables.is_empty() {
            return Vec::new();
        }
        let columns: Vec<String> = tables
            .iter()
            .flat_map(|t| metadata.sensitive_columns_named(t))
            .map(|c| format!("{}.{}", c.qualified_table(), c.column))
            .collect();
        vec![
            alert
                .with_metadata("sensitive_tables", tables)
                .with_metadata("sensitive_columns", columns),
        ]
    }
}
