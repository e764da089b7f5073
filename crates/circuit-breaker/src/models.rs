use brain_core::DecisionReason;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why the breaker went Hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardReason {
    DailyDrawdown,
    MinEquity,
    Manual,
}

impl HardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardReason::DailyDrawdown => "DAILY_DD",
            HardReason::MinEquity => "MIN_EQUITY",
            HardReason::Manual => "MANUAL",
        }
    }

    /// The rejection code signals receive while this reason holds.
    pub fn decision_reason(&self) -> DecisionReason {
        match self {
            HardReason::DailyDrawdown => DecisionReason::BreakerDailyDd,
            HardReason::MinEquity => DecisionReason::BreakerMinEquity,
            HardReason::Manual => DecisionReason::BreakerManual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Normal,
    SoftCooldown { until: DateTime<Utc> },
    Hard { reason: HardReason, since: DateTime<Utc> },
}

impl BreakerState {
    /// Severity order: a trigger at or below the current severity is a no-op.
    pub fn severity(&self) -> u8 {
        match self {
            BreakerState::Normal => 0,
            BreakerState::SoftCooldown { .. } => 1,
            BreakerState::Hard { .. } => 2,
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, BreakerState::Normal)
    }

    pub fn as_gauge(&self) -> u8 {
        self.severity()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerEventKind {
    Trigger,
    Reset,
}

impl BreakerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerEventKind::Trigger => "TRIGGER",
            BreakerEventKind::Reset => "RESET",
        }
    }
}

/// A persisted state transition with full context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerEvent {
    pub ts: DateTime<Utc>,
    pub kind: BreakerEventKind,
    pub reason: String,
    pub equity: Decimal,
    pub operator_id: Option<String>,
    pub context: serde_json::Value,
}
