//! Indexed snapshot of catalog facts used to correlate activity.

use crate::models::{GrantRecord, SensitiveColumn};
use std::collections::{BTreeMap, BTreeSet};

/// Sensitive columns and their grants, indexed by qualified table.
///
/// Table keys are lower-cased `catalog.schema.table` names, so tables sharing
/// a name in different schemas stay distinct. A second index maps bare table
/// names to their qualified keys for matching against query text, where the
/// schema is often omitted.
#[derive(Debug, Clone, Default)]
pub struct MetadataContext {
    columns_by_table: BTreeMap<String, Vec<SensitiveColumn>>,
    tables_by_name: BTreeMap<String, BTreeSet<String>>,
    grants_by_table: BTreeMap<String, Vec<GrantRecord>>,
}

impl MetadataContext {
    /// Index scan results. Grants on tables without sensitive columns are
    /// dropped.
    pub fn new(columns: Vec<SensitiveColumn>, grants: Vec<GrantRecord>) -> Self {
        let mut columns_by_table: BTreeMap<String, Vec<SensitiveColumn>> = BTreeMap::new();
        let mut tables_by_name: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for column in columns {
            let key = table_key(&column.catalog, &column.schema, &column.table);
            tables_by_name
                .entry(name_key(&column.table))
                .or_default()
                .insert(key.clone());
            columns_by_table.entry(key).or_default().push(column);
        }

        let mut grants_by_table: BTreeMap<String, Vec<GrantRecord>> = BTreeMap::new();
        for grant in grants {
            let key = table_key(&grant.table_catalog, &grant.table_schema, &grant.table_name);
            if columns_by_table.contains_key(&key) {
                grants_by_table.entry(key).or_default().push(grant);
            }
        }

        Self {
            columns_by_table,
            tables_by_name,
            grants_by_table,
        }
    }

    /// Columns of each sensitive table, in qualified-name order.
    pub fn sensitive_tables(&self) -> impl Iterator<Item = &[SensitiveColumn]> {
        self.columns_by_table.values().map(Vec::as_slice)
    }

    /// Number of tables holding at least one sensitive column.
    pub fn sensitive_table_count(&self) -> usize {
        self.columns_by_table.len()
    }

    /// Grants on a sensitive table; empty for any other table.
    pub fn grants_for(&self, catalog: &str, schema: &str, table: &str) -> &[GrantRecord] {
        self.grants_by_table
            .get(&table_key(catalog, schema, table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sensitive columns of every table with this bare name, across schemas.
    pub fn sensitive_columns_named(&self, table: &str) -> Vec<&SensitiveColumn> {
        self.tables_by_name
            .get(&name_key(table))
            .into_iter()
            .flatten()
            .filter_map(|key| self.columns_by_table.get(key))
            .flatten()
            .collect()
    }

    /// Sensitive table names found in the query text, in name order.
    ///
    /// A table matches when its name appears as a whole identifier, so
    /// `users` does not match `app_users_archive`.
    pub fn referenced_sensitive_tables(&self, query: &str) -> Vec<String> {
        let haystack = query.to_lowercase();
        self.tables_by_name
            .iter()
            .filter(|(name, _)| contains_identifier(&haystack, name))
            .filter_map(|(_, keys)| {
                keys.iter()
                    .find_map(|key| self.columns_by_table.get(key))
                    .and_then(|columns| columns.first())
                    .map(|c| c.table.clone())
            })
            .collect()
    }
}

fn table_key(catalog: &str, schema: &str, table: &str) -> String {
    format!(
        "{}.{}.{}",
        catalog.trim().to_lowercase(),
        schema.trim().to_lowercase(),
        name_key(table)
    )
}

fn name_key(table: &str) -> String {
    table.trim().to_lowercase()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whether `needle` occurs in `haystack` bounded by non-identifier characters.
fn contains_identifier(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}
