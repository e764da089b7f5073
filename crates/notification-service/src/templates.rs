use crate::AlertType;

/// Plain-text rendering of alerts for webhook payloads.
pub struct MessageTemplate;

impl MessageTemplate {
    /// (title, message) pair for an alert.
    pub fn render(alert_type: &AlertType) -> (String, String) {
        match alert_type {
            AlertType::BreakerTripped { reason, equity } => (
                format!("CIRCUIT BREAKER TRIPPED ({reason})"),
                format!(
                    "Trading halted. Reason: {reason}. Equity at trip: {equity}. \
                     All positions are being flattened; operator reset required."
                ),
            ),
            AlertType::BreakerReset {
                operator_id,
                reason,
            } => (
                "Circuit breaker reset".to_string(),
                format!("Breaker reset by {operator_id}: {reason}"),
            ),
            AlertType::FlattenFailed { attempts, error } => (
                "FLATTEN FAILED".to_string(),
                format!(
                    "Flatten directive failed after {attempts} attempts: {error}. \
                     Breaker stays hard; manual intervention required."
                ),
            ),
            AlertType::SweepCompleted {
                amount,
                total_swept,
            } => (
                "Profit sweep completed".to_string(),
                format!("Swept {amount} to the safe balance (lifetime total {total_swept})."),
            ),
            AlertType::SweepFailed { amount, error } => (
                "Sweep FAILED".to_string(),
                format!(
                    "Transfer of {amount} failed after retries: {error}. \
                     Treasury counters unchanged."
                ),
            ),
            AlertType::DecisionSendFailed {
                signal_id,
                decision_id,
                error,
            } => (
                "Order send failed".to_string(),
                format!(
                    "Approved decision {decision_id} (signal {signal_id}) could not \
                     reach the execution engine: {error}. Marked SEND_FAILED."
                ),
            ),
            AlertType::StoreDegraded { buffered_events } => (
                "State store degraded".to_string(),
                format!(
                    "Store writes are failing; {buffered_events} events buffered in \
                     memory. New approvals are refused until the store recovers."
                ),
            ),
            AlertType::DailyReport {
                date,
                realized_pnl,
                decisions_total,
                decisions_approved,
                equity,
                total_swept,
            } => {
                let approval_rate = if *decisions_total > 0 {
                    100.0 * *decisions_approved as f64 / *decisions_total as f64
                } else {
                    0.0
                };
                (
                    format!("Daily report {date}"),
                    format!(
                        "PnL: {realized_pnl}\nDecisions: {decisions_total} ({approval_rate:.1}% approved)\n\
                         Equity: {equity}\nTotal swept: {total_swept}"
                    ),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn daily_report_includes_approval_rate() {
        let (_, message) = MessageTemplate::render(&AlertType::DailyReport {
            date: "2026-03-15".to_string(),
            realized_pnl: dec!(142.50),
            decisions_total: 40,
            decisions_approved: 30,
            equity: dec!(10142.50),
            total_swept: dec!(500),
        });
        assert!(message.contains("75.0% approved"));
    }

    #[test]
    fn zero_decisions_does_not_divide_by_zero() {
        let (_, message) = MessageTemplate::render(&AlertType::DailyReport {
            date: "2026-03-15".to_string(),
            realized_pnl: dec!(0),
            decisions_total: 0,
            decisions_approved: 0,
            equity: dec!(1000),
            total_swept: dec!(0),
        });
        assert!(message.contains("0.0% approved"));
    }
}
