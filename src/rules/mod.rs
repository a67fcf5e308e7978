//! Detection rules.
//!
//! A [`Rule`] inspects one activity record and may emit alerts. The
//! [`RuleEngine`] runs an ordered list of rules over a batch of records;
//! rules are independent and every rule sees every record. Output order is
//! source-row order, then rule registration order.

pub mod access;
pub mod full_scan;
pub mod monitor;
pub mod off_hours;

pub use access::AccessAnalyzer;
pub use full_scan::FullScanRule;
pub use monitor::ActivityMonitor;
pub use off_hours::OffHoursRule;

use crate::metadata::MetadataContext;
use crate::models::{ActivityRecord, Alert};
use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

/// Number of query-text characters kept as the alert object.
pub const OBJECT_PREVIEW_CHARS: usize = 50;

/// Per-record inputs shared by all rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Record timestamp with the offset the backend reported
    pub timestamp: DateTime<FixedOffset>,
    /// Present only when metadata correlation is enabled
    pub metadata: Option<&'a MetadataContext>,
}

/// A single detection rule.
pub trait Rule: Send + Sync {
    /// Stable rule name for logging.
    fn name(&self) -> &'static str;

    /// Inspect one record. Alerts are kept in the order returned.
    fn evaluate(&self, record: &ActivityRecord, ctx: &RuleContext<'_>) -> Vec<Alert>;
}

/// First [`OBJECT_PREVIEW_CHARS`] characters of a query.
pub fn object_preview(query_text: &str) -> String {
    query_text.chars().take(OBJECT_PREVIEW_CHARS).collect()
}

/// Ordered set of rules.
#[derive(Default)]
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl RuleEngine {
    /// An engine with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full-scan then off-hours.
    pub fn with_default_rules() -> Self {
        Self::new()
            .with_rule(FullScanRule)
            .with_rule(OffHoursRule::default())
    }

    /// Append a rule; it runs after every rule already registered.
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn add_rule(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate records without metadata correlation.
    pub fn evaluate(&self, records: &[ActivityRecord]) -> Vec<Alert> {
        self.evaluate_with_context(records, None)
    }

    /// Evaluate records, optionally correlating with catalog metadata.
    ///
    /// Records whose timestamp cannot be parsed are skipped.
    pub fn evaluate_with_context(
        &self,
        records: &[ActivityRecord],
        metadata: Option<&MetadataContext>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for record in records {
            let Some(timestamp) = record.parsed_timestamp() else {
                warn!(
                    user = %record.user,
                    timestamp = %record.timestamp,
                    "Skipping activity record with unparseable timestamp"
                );
                continue;
            };
            let ctx = RuleContext {
                timestamp,
                metadata,
            };
            for rule in &self.rules {
                let matched = rule.evaluate(record, &ctx);
                if !matched.is_empty() {
                    debug!(
                        rule = rule.name(),
                        user = %record.user,
                        alerts = matched.len(),
                        "Rule matched"
                    );
                }
                alerts.extend(matched);
            }
        }
        alerts
    }
}
