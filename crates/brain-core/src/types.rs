use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Unified brain types shared across every crate in the workspace
// ---------------------------------------------------------------------------

/// The three upstream strategy generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseId {
    P1,
    P2,
    P3,
}

impl PhaseId {
    pub const ALL: [PhaseId; 3] = [PhaseId::P1, PhaseId::P2, PhaseId::P3];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseId::P1 => "P1",
            PhaseId::P2 => "P2",
            PhaseId::P3 => "P3",
        }
    }

    /// Dispatch priority. Higher drains first (P3 > P2 > P1).
    pub fn priority(&self) -> u8 {
        match self {
            PhaseId::P1 => 1,
            PhaseId::P2 => 2,
            PhaseId::P3 => 3,
        }
    }

    /// Index into allocation weight vectors.
    pub fn index(&self) -> usize {
        match self {
            PhaseId::P1 => 0,
            PhaseId::P2 => 1,
            PhaseId::P3 => 2,
        }
    }
}

impl FromStr for PhaseId {
    type Err = crate::BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P1" | "p1" => Ok(PhaseId::P1),
            "P2" | "p2" => Ok(PhaseId::P2),
            "P3" | "p3" => Ok(PhaseId::P3),
            other => Err(crate::BrainError::UnknownPhase(other.to_string())),
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Sign applied to notional when computing portfolio delta.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl FromStr for Side {
    type Err = crate::BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" | "buy" => Ok(Side::Buy),
            "SELL" | "sell" => Ok(Side::Sell),
            other => Err(crate::BrainError::MalformedSignal(format!(
                "invalid side '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse equity bucket governing leverage caps and allocation ramps.
///
/// Boundaries (account currency): Micro < 1500, Small [1500, 5000),
/// Medium [5000, 25000), Large [25000, 50000), Institutional >= 50000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EquityTier {
    Micro,
    Small,
    Medium,
    Large,
    Institutional,
}

impl EquityTier {
    pub fn from_equity(equity: Decimal) -> Self {
        if equity < Decimal::from(1500) {
            EquityTier::Micro
        } else if equity < Decimal::from(5000) {
            EquityTier::Small
        } else if equity < Decimal::from(25000) {
            EquityTier::Medium
        } else if equity < Decimal::from(50000) {
            EquityTier::Large
        } else {
            EquityTier::Institutional
        }
    }

    /// Maximum gross leverage permitted in this tier.
    pub fn max_leverage(&self) -> Decimal {
        match self {
            EquityTier::Micro => Decimal::from(20),
            EquityTier::Small => Decimal::from(10),
            EquityTier::Medium => Decimal::from(5),
            EquityTier::Large => Decimal::from(3),
            EquityTier::Institutional => Decimal::from(2),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EquityTier::Micro => "micro",
            EquityTier::Small => "small",
            EquityTier::Medium => "medium",
            EquityTier::Large => "large",
            EquityTier::Institutional => "institutional",
        }
    }
}

impl fmt::Display for EquityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquityTier {
    type Err = crate::BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "micro" => Ok(EquityTier::Micro),
            "small" => Ok(EquityTier::Small),
            "medium" => Ok(EquityTier::Medium),
            "large" => Ok(EquityTier::Large),
            "institutional" => Ok(EquityTier::Institutional),
            other => Err(crate::BrainError::MalformedSignal(format!(
                "invalid tier '{other}'"
            ))),
        }
    }
}

/// An immutable intent produced by a phase generator.
///
/// `signature` covers `timestamp_ms|nonce|payload_json` where payload_json is
/// the canonical serialization of the business fields (see [`crate::signing`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSignal {
    pub signal_id: String,
    pub phase_id: PhaseId,
    pub symbol: String,
    pub side: Side,
    pub requested_notional: Decimal,
    /// Marks a delta-reducing intent. Only honored for P3 signals.
    #[serde(default)]
    pub hedge: bool,
    pub timestamp_ms: i64,
    pub nonce: String,
    pub signature: String,
}

impl IntentSignal {
    /// Basic shape validation before the signal enters the pipeline.
    pub fn validate(&self) -> Result<(), crate::BrainError> {
        if self.signal_id.is_empty() {
            return Err(crate::BrainError::MalformedSignal(
                "empty signal_id".to_string(),
            ));
        }
        if self.symbol.is_empty() {
            return Err(crate::BrainError::MalformedSignal(
                "empty symbol".to_string(),
            ));
        }
        if self.requested_notional <= Decimal::ZERO {
            return Err(crate::BrainError::MalformedSignal(format!(
                "non-positive notional {}",
                self.requested_notional
            )));
        }
        Ok(())
    }
}

/// Read-synchronized view of one open position owned by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub notional: Decimal,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Signed notional: long positive, short negative.
    pub fn signed_notional(&self) -> Decimal {
        self.side.sign() * self.notional
    }
}

/// Fill confirmation flowing back from the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub signal_id: String,
    pub phase_id: PhaseId,
    pub symbol: String,
    pub side: Side,
    pub notional: Decimal,
    pub price: Decimal,
    pub pnl: Decimal,
    /// Account equity reported by the engine after this fill settled.
    pub equity_after: Decimal,
    pub ts: DateTime<Utc>,
}

/// Stable machine-readable outcome codes returned to originators and
/// persisted with every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    Ok,
    HedgeAutoApprove,
    HighCorrelation,
    LeverageCap,
    NetDelta,
    PhaseBudget,
    StaleRiskData,
    Cooldown,
    BreakerDailyDd,
    BreakerMinEquity,
    BreakerManual,
    BreakerTriggered,
    SendFailed,
    Duplicate,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Ok => "OK",
            DecisionReason::HedgeAutoApprove => "HEDGE_AUTO_APPROVE",
            DecisionReason::HighCorrelation => "HIGH_CORRELATION",
            DecisionReason::LeverageCap => "LEVERAGE_CAP",
            DecisionReason::NetDelta => "NET_DELTA",
            DecisionReason::PhaseBudget => "PHASE_BUDGET",
            DecisionReason::StaleRiskData => "STALE_RISK_DATA",
            DecisionReason::Cooldown => "COOLDOWN",
            DecisionReason::BreakerDailyDd => "BREAKER_DAILY_DD",
            DecisionReason::BreakerMinEquity => "BREAKER_MIN_EQUITY",
            DecisionReason::BreakerManual => "BREAKER_MANUAL",
            DecisionReason::BreakerTriggered => "BREAKER_TRIGGERED",
            DecisionReason::SendFailed => "SEND_FAILED",
            DecisionReason::Duplicate => "DUPLICATE",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionReason {
    type Err = crate::BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(DecisionReason::Ok),
            "HEDGE_AUTO_APPROVE" => Ok(DecisionReason::HedgeAutoApprove),
            "HIGH_CORRELATION" => Ok(DecisionReason::HighCorrelation),
            "LEVERAGE_CAP" => Ok(DecisionReason::LeverageCap),
            "NET_DELTA" => Ok(DecisionReason::NetDelta),
            "PHASE_BUDGET" => Ok(DecisionReason::PhaseBudget),
            "STALE_RISK_DATA" => Ok(DecisionReason::StaleRiskData),
            "COOLDOWN" => Ok(DecisionReason::Cooldown),
            "BREAKER_DAILY_DD" => Ok(DecisionReason::BreakerDailyDd),
            "BREAKER_MIN_EQUITY" => Ok(DecisionReason::BreakerMinEquity),
            "BREAKER_MANUAL" => Ok(DecisionReason::BreakerManual),
            "BREAKER_TRIGGERED" => Ok(DecisionReason::BreakerTriggered),
            "SEND_FAILED" => Ok(DecisionReason::SendFailed),
            "DUPLICATE" => Ok(DecisionReason::Duplicate),
            other => Err(crate::BrainError::MalformedSignal(format!(
                "unknown reason '{other}'"
            ))),
        }
    }
}

/// Allocation state captured at decision time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub w1: f64,
    pub w2: f64,
    pub w3: f64,
    pub tier: EquityTier,
    pub max_leverage: f64,
    pub override_active: bool,
}

impl AllocationSnapshot {
    pub fn weight_for(&self, phase: PhaseId) -> f64 {
        match phase {
            PhaseId::P1 => self.w1,
            PhaseId::P2 => self.w2,
            PhaseId::P3 => self.w3,
        }
    }
}

/// Risk state captured at decision time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub projected_leverage: f64,
    pub net_delta: Decimal,
    /// Highest pairwise correlation against an existing same-side position.
    pub correlation_peak: f64,
    pub portfolio_beta: f64,
    pub matrix_age_secs: i64,
}

/// Phase performance captured at decision time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub sharpe: f64,
    pub modifier: f64,
    pub trades_7d: usize,
}

/// The at-most-once verdict the Brain issues for a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainDecision {
    pub decision_id: String,
    pub signal_id: String,
    pub phase_id: PhaseId,
    pub approved: bool,
    pub requested_notional: Decimal,
    pub authorised_notional: Decimal,
    pub reason: DecisionReason,
    pub allocation: Option<AllocationSnapshot>,
    pub risk: Option<RiskSnapshot>,
    pub performance: Option<PerformanceSnapshot>,
    pub ts: DateTime<Utc>,
}

impl BrainDecision {
    /// A rejection carrying no sizing work (breaker gate, stale data).
    pub fn rejected(
        decision_id: String,
        signal: &IntentSignal,
        reason: DecisionReason,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            decision_id,
            signal_id: signal.signal_id.clone(),
            phase_id: signal.phase_id,
            approved: false,
            requested_notional: signal.requested_notional,
            authorised_notional: Decimal::ZERO,
            reason,
            allocation: None,
            risk: None,
            performance: None,
            ts,
        }
    }
}
