//! Privilege review.

use crate::metadata::MetadataContext;
use crate::models::{Alert, GrantedTo, Severity};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

pub const EXCESSIVE_PRIVILEGES: &str = "EXCESSIVE_PRIVILEGES";
pub const DEFAULT_PRIVILEGE_THRESHOLD: usize = 3;

/// Flags grantees holding privileges on many sensitive tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessAnalyzer {
    /// Minimum number of distinct sensitive tables that triggers an alert
    pub threshold: usize,
}

impl Default for AccessAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_PRIVILEGE_THRESHOLD)
    }
}

#[derive(Default)]
struct GranteeAccess {
    tables: BTreeSet<String>,
    privileges: BTreeSet<String>,
}

impl AccessAnalyzer {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn excessive_privileges(&self, context: &MetadataContext) -> Vec<Alert> {
        self.excessive_privileges_at(context, Utc::now())
    }

    /// One high alert per grantee over the threshold, ordered by grantee.
    ///
    /// Tables are counted by qualified name, so a grant only counts when the
    /// same catalog, schema and table holds a sensitive column.
    pub fn excessive_privileges_at(
        &self,
        context: &MetadataContext,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut by_grantee: BTreeMap<(String, GrantedTo), GranteeAccess> = BTreeMap::new();
        for columns in context.sensitive_tables() {
            let Some(first) = columns.first() else {
                continue;
            };
            let table = first.qualified_table();
            for grant in context.grants_for(&first.catalog, &first.schema, &first.table) {
                let access = by_grantee
                    .entry((grant.grantee_name.clone(), grant.granted_to))
                    .or_default();
                access.tables.insert(table.clone());
                access.privileges.insert(grant.privilege.to_uppercase());
            }
        }

        by_grantee
            .into_iter()
            .filter(|(_, access)| access.tables.len() >= self.threshold)
            .map(|((grantee, granted_to), access)| {
                let description = format!(
                    "{} {} holds privileges on {} sensitive tables",
                    granted_to.as_str(),
                    grantee,
                    access.tables.len()
                );
                Alert::new(
                    EXCESSIVE_PRIVILEGES,
                    Severity::High,
                    grantee.clone(),
                    grantee,
                    now,
                    description,
                )
                .with_metadata("granted_to", granted_to.as_str())
                .with_metadata("tables", access.tables.into_iter().collect::<Vec<_>>())
                .with_metadata(
                    "privileges",
                    access.privileges.into_iter().collect::<Vec<_>>(),
                )
            })
            .collect()
    }
}
