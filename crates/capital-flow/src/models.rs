use brain_core::EquityTier;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The treasury the Capital Flow Manager owns.
///
/// `total_swept` and `high_watermark` are ratchets: they only ever grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryState {
    pub risky_balance: Decimal,
    pub safe_balance: Decimal,
    pub total_swept: Decimal,
    pub high_watermark: Decimal,
    pub reserve_floor: Decimal,
}

impl TreasuryState {
    pub fn new(risky_balance: Decimal, safe_balance: Decimal, reserve_floor: Decimal) -> Self {
        Self {
            risky_balance,
            safe_balance,
            total_swept: Decimal::ZERO,
            high_watermark: Decimal::ZERO,
            reserve_floor,
        }
    }
}

/// Expected risky-bucket size per tier, driving the sweep threshold.
/// Configured per deployment rather than derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTargets {
    pub micro: Decimal,
    pub small: Decimal,
    pub medium: Decimal,
    pub large: Decimal,
    pub institutional: Decimal,
}

impl TierTargets {
    pub fn for_tier(&self, tier: EquityTier) -> Decimal {
        match tier {
            EquityTier::Micro => self.micro,
            EquityTier::Small => self.small,
            EquityTier::Medium => self.medium,
            EquityTier::Large => self.large,
            EquityTier::Institutional => self.institutional,
        }
    }
}

impl Default for TierTargets {
    fn default() -> Self {
        Self {
            micro: Decimal::from(1000),
            small: Decimal::from(3500),
            medium: Decimal::from(15000),
            large: Decimal::from(37500),
            institutional: Decimal::from(75000),
        }
    }
}

/// A sweep the manager has decided to run but not yet executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPlan {
    pub sweep_id: String,
    pub amount: Decimal,
    pub target_allocation: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreasuryOpKind {
    Sweep,
    Manual,
}

impl TreasuryOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreasuryOpKind::Sweep => "SWEEP",
            TreasuryOpKind::Manual => "MANUAL",
        }
    }
}

/// Persistable record of a completed treasury operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryOp {
    pub ts: DateTime<Utc>,
    pub kind: TreasuryOpKind,
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub post_hwm: Decimal,
    pub reason: String,
}
