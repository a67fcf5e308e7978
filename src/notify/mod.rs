//! Alert notification.
//!
//! Delivery is best effort: [`Notifier::notify`] makes at most one outbound
//! attempt and reports the outcome as a [`DeliveryStatus`] instead of an
//! error, so a broken webhook never affects the caller.

pub mod payload;

pub use payload::{WebhookPayload, severity_color};

use crate::error::{WatchError, WatchResult};
use crate::models::{Alert, Severity};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// No endpoint configured
    Skipped,
    Delivered,
    /// Logged, never propagated
    Failed,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> DeliveryStatus;
}

/// Posts alerts to a chat webhook.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    endpoint: Option<Url>,
    client: reqwest::Client,
}

impl NotificationDispatcher {
    /// Create a dispatcher; `None` disables delivery.
    pub fn new(endpoint: Option<Url>, timeout: Duration) -> WatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatchError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { endpoint, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn deliver(&self, endpoint: &Url, alert: &Alert) -> WatchResult<()> {
        let payload = WebhookPayload::from_alert(alert);
        let response = self
            .client
            .post(endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| WatchError::delivery_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::delivery_failed(format!(
                "webhook responded with {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn notify(&self, alert: &Alert) -> DeliveryStatus {
        let Some(endpoint) = &self.endpoint else {
            debug!(alert_type = %alert.alert_type, "No webhook configured, skipping notification");
            return DeliveryStatus::Skipped;
        };

        match self.deliver(endpoint, alert).await {
            Ok(()) => {
                info!(
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    user = %alert.user,
                    "Alert notification delivered"
                );
                DeliveryStatus::Delivered
            }
            Err(e) => {
                warn!(
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    error = %e,
                    "Alert notification failed"
                );
                DeliveryStatus::Failed
            }
        }
    }
}

/// Hand every alert at or above `threshold` to the notifier on its own task.
///
/// Returns the spawned handles; callers that do not care about the outcome
/// may drop them.
pub fn spawn_notifications(
    notifier: Arc<dyn Notifier>,
    alerts: &[Alert],
    threshold: Severity,
) -> Vec<JoinHandle<DeliveryStatus>> {
    alerts
        .iter()
        .filter(|alert| alert.is_at_least(threshold))
        .cloned()
        .map(|alert| {
            let notifier = Arc::clone(&notifier);
            tokio::spawn(async move { notifier.notify(&alert).await })
        })
        .collect()
}
