use std::sync::Arc;

use {
    tgdrive_common::{DeliveryOutcome, DeliveryStatus},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use tgdrive_metrics::{counter, notify as notify_metrics};

use crate::ChatGateway;

/// Whether a chat message reached its recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyReport {
    Delivered,
    /// Delivery failed; the detail is for side channels such as the
    /// browser response, never for the transfer result.
    Failed(String),
}

impl NotifyReport {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// User-facing text for a transfer outcome.
#[must_use]
pub fn outcome_text(outcome: &DeliveryOutcome) -> String {
    match &outcome.status {
        DeliveryStatus::Delivered { link } => format!(
            "✅ Upload complete!\n\nFile: {}\nDownload link:\n{link}",
            outcome.file_name
        ),
        DeliveryStatus::Failed { detail, .. } => format!("❌ Upload failed: {detail}"),
    }
}

/// Best-effort delivery of messages to chat users.
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: Arc<dyn ChatGateway>,
}

impl NotificationDispatcher {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }

    /// Tell the outcome's recipient how their transfer ended.
    pub async fn notify(&self, outcome: &DeliveryOutcome) -> NotifyReport {
        self.send_text(&outcome.recipient, &outcome_text(outcome))
            .await
    }

    /// Send `text` to `to`, absorbing any gateway failure into the report.
    pub async fn send_text(&self, to: &str, text: &str) -> NotifyReport {
        match self.gateway.send_message(to, text).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(notify_metrics::SENT_TOTAL).increment(1);

                debug!(recipient = to, "chat notification sent");
                NotifyReport::Delivered
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(notify_metrics::FAILED_TOTAL).increment(1);

                warn!(recipient = to, error = %e, "chat notification failed");
                NotifyReport::Failed(e.to_string())
            },
        }
    }
}
