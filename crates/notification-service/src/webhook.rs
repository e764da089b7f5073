use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::{Alert, NotificationChannel, NotificationError};

/// Webhook channel for operator paging. Skips silently when unconfigured so
/// the Brain never blocks on missing ops plumbing.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    /// Read `OPERATOR_WEBHOOK_URL`; empty means alerts are logged only.
    pub fn from_env() -> Self {
        Self::new(std::env::var("OPERATOR_WEBHOOK_URL").unwrap_or_default())
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        if self.webhook_url.is_empty() {
            tracing::debug!(title = %alert.title, "webhook not configured, skipping alert");
            return Ok(());
        }

        let payload = json!({
            "title": alert.title,
            "message": alert.message,
            "page": alert.alert_type.is_page(),
            "timestamp": alert.timestamp.to_rfc3339(),
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Webhook(e.to_string()))?
            .error_for_status()
            .map_err(|e| NotificationError::Webhook(e.to_string()))?;

        tracing::debug!(title = %alert.title, "operator alert dispatched");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
