//! Activity outside business hours.

use crate::models::metadata::to_utc;
use crate::models::{ActivityRecord, Alert, Severity};
use crate::rules::{Rule, RuleContext, object_preview};
use chrono::Timelike;

pub const OFF_HOURS_ACCESS: &str = "OFF_HOURS_ACCESS";

pub const DEFAULT_BUSINESS_START_HOUR: u32 = 6;
pub const DEFAULT_BUSINESS_END_HOUR: u32 = 22;

/// Flags queries whose wall-clock time falls outside `[start, end)`.
///
/// The wall clock is the one in the offset the backend reported, which is
/// UTC for sessions opened by this tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffHoursRule {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for OffHoursRule {
    fn default() -> Self {
        Self {
            start_hour: DEFAULT_BUSINESS_START_HOUR,
            end_hour: DEFAULT_BUSINESS_END_HOUR,
        }
    }
}

impl OffHoursRule {
    pub fn is_business_hour(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

impl Rule for OffHoursRule {
    fn name(&self) -> &'static str {
        "off_hours_access"
    }

    fn evaluate(&self, record: &ActivityRecord, ctx: &RuleContext<'_>) -> Vec<Alert> {
        if self.is_business_hour(ctx.timestamp.hour()) {
            return Vec::new();
        }
        vec![Alert::new(
            OFF_HOURS_ACCESS,
            Severity::Low,
            object_preview(&record.query_text),
            record.user.clone(),
            to_utc(ctx.timestamp),
            "Query executed outside business hours",
        )]
    }
}
