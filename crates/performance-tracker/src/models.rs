use brain_core::PhaseId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One realized trade outcome in a phase's log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ts: DateTime<Utc>,
    pub pnl: Decimal,
}

/// Derived per-phase figures, computed fresh on demand and persisted on the
/// daily schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseAggregates {
    pub phase_id: PhaseId,
    pub trades_in_window: usize,
    pub mean_pnl: f64,
    pub stdev_pnl: f64,
    pub sharpe: f64,
    pub modifier: f64,
}
