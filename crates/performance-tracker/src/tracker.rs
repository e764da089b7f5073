//! Per-phase rolling risk-adjusted performance.
//!
//! Each phase owns an ordered trade log; writes are serialized per phase and
//! readers compute windowed statistics against a consistent snapshot. The
//! modifier is the bonus/malus multiplier the Arbiter applies to a phase's
//! base allocation weight.

use std::collections::VecDeque;
use std::sync::RwLock;

use brain_core::{PerformanceSnapshot, PhaseId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::models::{PhaseAggregates, TradeRecord};

/// Modifier window: trades inside the last 7 days drive the statistic.
const MODIFIER_WINDOW_DAYS: i64 = 7;

/// Minimum trades inside the window before the statistic is trusted.
const MIN_TRADES: usize = 10;

/// Logs are pruned past the longest lookback anyone computes over.
const RETENTION_DAYS: i64 = 30;

const STDEV_EPSILON: f64 = 1e-9;

#[derive(Default)]
struct PhaseLog {
    trades: VecDeque<TradeRecord>,
}

impl PhaseLog {
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        while let Some(front) = self.trades.front() {
            if front.ts < cutoff {
                self.trades.pop_front();
            } else {
                break;
            }
        }
    }

    fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<f64> {
        self.trades
            .iter()
            .filter(|t| t.ts >= from && t.ts <= to)
            .filter_map(|t| t.pnl.to_f64())
            .collect()
    }
}

pub struct PerformanceTracker {
    phases: [RwLock<PhaseLog>; 3],
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            phases: [
                RwLock::new(PhaseLog::default()),
                RwLock::new(PhaseLog::default()),
                RwLock::new(PhaseLog::default()),
            ],
        }
    }

    fn log(&self, phase: PhaseId) -> &RwLock<PhaseLog> {
        &self.phases[phase.index()]
    }

    /// Append a realized trade to the phase's log.
    pub fn record(&self, phase: PhaseId, pnl: Decimal, ts: DateTime<Utc>) {
        let mut log = self.log(phase).write().expect("phase log lock poisoned");
        // Fills arrive in persist order; a late fill is inserted where it belongs.
        if log.trades.back().is_some_and(|last| last.ts > ts) {
            let idx = log.trades.partition_point(|t| t.ts <= ts);
            log.trades.insert(idx, TradeRecord { ts, pnl });
        } else {
            log.trades.push_back(TradeRecord { ts, pnl });
        }
        log.prune(ts);
    }

    /// Replace a phase's log wholesale (startup recovery).
    pub fn load(&self, phase: PhaseId, mut records: Vec<TradeRecord>) {
        records.sort_by_key(|r| r.ts);
        let mut log = self.log(phase).write().expect("phase log lock poisoned");
        log.trades = records.into();
        if let Some(last_ts) = log.trades.back().map(|t| t.ts) {
            log.prune(last_ts);
        }
    }

    /// Trades recorded for the phase within the last `days` before `now`.
    pub fn trades_in_window(&self, phase: PhaseId, days: i64, now: DateTime<Utc>) -> usize {
        let log = self.log(phase).read().expect("phase log lock poisoned");
        log.window(now - Duration::days(days), now).len()
    }

    /// Windowed Sharpe over the trade PnL series: mean * sqrt(N) / stdev.
    ///
    /// Returns 0 when the window holds fewer than 10 trades or the deviation
    /// collapses. No annualisation; the modifier thresholds bake in the scale.
    pub fn sharpe_at(&self, phase: PhaseId, window_days: i64, now: DateTime<Utc>) -> f64 {
        let log = self.log(phase).read().expect("phase log lock poisoned");
        let pnls = log.window(now - Duration::days(window_days), now);
        sharpe_of(&pnls)
    }

    pub fn sharpe(&self, phase: PhaseId, window_days: i64) -> f64 {
        self.sharpe_at(phase, window_days, Utc::now())
    }

    /// Bonus/malus multiplier in [0.5, 1.2] for the phase's base weight.
    ///
    /// Defaults to 1.0 until the 7-day window holds at least 10 trades, then
    /// maps Sharpe <= 0 to 0.5, Sharpe >= 2 to 1.2, linear in between
    /// (anchored at 1.0 for Sharpe 0).
    pub fn modifier_at(&self, phase: PhaseId, now: DateTime<Utc>) -> f64 {
        let log = self.log(phase).read().expect("phase log lock poisoned");
        let pnls = log.window(now - Duration::days(MODIFIER_WINDOW_DAYS), now);
        if pnls.len() < MIN_TRADES {
            return 1.0;
        }
        modifier_for_sharpe(sharpe_of(&pnls))
    }

    pub fn modifier(&self, phase: PhaseId) -> f64 {
        self.modifier_at(phase, Utc::now())
    }

    /// Decision-time snapshot for one phase.
    pub fn snapshot_at(&self, phase: PhaseId, now: DateTime<Utc>) -> PerformanceSnapshot {
        let log = self.log(phase).read().expect("phase log lock poisoned");
        let pnls = log.window(now - Duration::days(MODIFIER_WINDOW_DAYS), now);
        let sharpe = sharpe_of(&pnls);
        let modifier = if pnls.len() < MIN_TRADES {
            1.0
        } else {
            modifier_for_sharpe(sharpe)
        };
        PerformanceSnapshot {
            sharpe,
            modifier,
            trades_7d: pnls.len(),
        }
    }

    /// Full aggregates for all phases (daily persistence schedule).
    pub fn aggregates_at(&self, now: DateTime<Utc>) -> Vec<PhaseAggregates> {
        PhaseId::ALL
            .iter()
            .map(|&phase| {
                let log = self.log(phase).read().expect("phase log lock poisoned");
                let pnls = log.window(now - Duration::days(MODIFIER_WINDOW_DAYS), now);
                let (mean, stdev) = mean_stdev(&pnls);
                let sharpe = sharpe_of(&pnls);
                let modifier = if pnls.len() < MIN_TRADES {
                    1.0
                } else {
                    modifier_for_sharpe(sharpe)
                };
                PhaseAggregates {
                    phase_id: phase,
                    trades_in_window: pnls.len(),
                    mean_pnl: mean,
                    stdev_pnl: stdev,
                    sharpe,
                    modifier,
                }
            })
            .collect()
    }
}

fn mean_stdev(pnls: &[f64]) -> (f64, f64) {
    if pnls.len() < 2 {
        return (pnls.first().copied().unwrap_or(0.0), 0.0);
    }
    let n = pnls.len() as f64;
    let mean = pnls.iter().sum::<f64>() / n;
    let variance = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn sharpe_of(pnls: &[f64]) -> f64 {
    if pnls.len() < MIN_TRADES {
        return 0.0;
    }
    let (mean, stdev) = mean_stdev(pnls);
    if stdev < STDEV_EPSILON {
        return 0.0;
    }
    mean * (pnls.len() as f64).sqrt() / stdev
}

fn modifier_for_sharpe(sharpe: f64) -> f64 {
    let raw = if sharpe < 0.0 {
        0.5
    } else if sharpe > 2.0 {
        1.2
    } else {
        1.0 + 0.1 * sharpe
    };
    raw.clamp(0.5, 1.2)
}
