mod templates;
mod webhook;

pub use templates::MessageTemplate;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Alert types the Brain dispatches to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertType {
    BreakerTripped {
        reason: String,
        equity: Decimal,
    },
    BreakerReset {
        operator_id: String,
        reason: String,
    },
    FlattenFailed {
        attempts: u32,
        error: String,
    },
    SweepCompleted {
        amount: Decimal,
        total_swept: Decimal,
    },
    SweepFailed {
        amount: Decimal,
        error: String,
    },
    DecisionSendFailed {
        signal_id: String,
        decision_id: String,
        error: String,
    },
    StoreDegraded {
        buffered_events: usize,
    },
    DailyReport {
        date: String,
        realized_pnl: Decimal,
        decisions_total: u64,
        decisions_approved: u64,
        equity: Decimal,
        total_swept: Decimal,
    },
}

impl AlertType {
    /// Pages the operator rather than just informing them.
    pub fn is_page(&self) -> bool {
        matches!(
            self,
            AlertType::BreakerTripped { .. }
                | AlertType::FlattenFailed { .. }
                | AlertType::SweepFailed { .. }
                | AlertType::StoreDegraded { .. }
        )
    }
}

/// A notification alert to be dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(alert_type: AlertType) -> Self {
        let (title, message) = MessageTemplate::render(&alert_type);
        Self {
            alert_type,
            timestamp: chrono::Utc::now(),
            title,
            message,
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("webhook error: {0}")]
    Webhook(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// A channel that logs and drops every alert. Used when no webhook is
/// configured and in tests.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationChannel for NoopNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        tracing::info!(title = %alert.title, "operator alert (no channel configured)");
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn breaker_alerts_page_the_operator() {
        assert!(AlertType::BreakerTripped {
            reason: "DAILY_DD".to_string(),
            equity: dec!(8400),
        }
        .is_page());
        assert!(!AlertType::SweepCompleted {
            amount: dec!(3000),
            total_swept: dec!(3000),
        }
        .is_page());
    }

    #[test]
    fn alert_renders_title_and_message() {
        let alert = Alert::new(AlertType::SweepFailed {
            amount: dec!(3000),
            error: "wallet timeout".to_string(),
        });
        assert!(alert.title.contains("Sweep"));
        assert!(alert.message.contains("wallet timeout"));
    }
}
