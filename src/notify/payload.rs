//! Chat webhook payload.
//!
//! Uses the legacy attachment format accepted by Slack-compatible incoming
//! webhooks.

use crate::models::Alert;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

pub const NEUTRAL_COLOR: &str = "#cccccc";

/// Attachment color for a severity label; unknown labels are neutral.
pub fn severity_color(label: &str) -> &'static str {
    match label.trim().to_ascii_lowercase().as_str() {
        "low" => "#36a64f",
        "medium" => "#ffcc00",
        "high" => "#ff9900",
        "critical" => "#ff0000",
        _ => NEUTRAL_COLOR,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub color: String,
    pub title: String,
    pub fields: Vec<Field>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    fn new(title: &str, value: impl Into<String>, short: bool) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short,
        }
    }
}

impl WebhookPayload {
    /// Single-attachment payload describing one alert.
    pub fn from_alert(alert: &Alert) -> Self {
        let attachment = Attachment {
            color: severity_color(alert.severity.as_str()).to_string(),
            title: format!("{} ({})", alert.alert_type, alert.severity),
            fields: vec![
                Field::new("User", alert.user.clone(), true),
                Field::new("Object", alert.object.clone(), true),
                Field::new(
                    "Time",
                    alert.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                    false,
                ),
            ],
            text: alert.description.clone(),
        };
        Self {
            attachments: vec![attachment],
        }
    }
}
