//! Portfolio-level validation of candidate signals.
//!
//! Checks run in a fixed order: staleness fail-safe, P3 hedge fast-path,
//! projected leverage, net delta bound, correlation guard. The Guardian never
//! sizes a signal up; it grants the requested amount, half of it, or nothing.

use brain_core::{DecisionReason, EquityTier, IntentSignal, PhaseId, RiskSnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::correlation::{CorrelationEngine, CorrelationMatrix};
use crate::models::GuardianDecision;
use crate::positions::PositionsSnapshot;

#[derive(Debug, Clone)]
pub struct GuardianConfig {
    /// Pairwise correlation above which same-side size is halved.
    pub max_pairwise_correlation: f64,
    /// |delta| / equity bound applied after the leverage check.
    pub max_delta_ratio: f64,
    /// Risk data older than this vetoes everything.
    pub staleness_limit_secs: i64,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            max_pairwise_correlation: 0.8,
            max_delta_ratio: 1.0,
            staleness_limit_secs: 300,
        }
    }
}

pub struct RiskGuardian {
    config: GuardianConfig,
}

impl RiskGuardian {
    pub fn new(config: GuardianConfig) -> Self {
        Self { config }
    }

    /// Validate a candidate signal (already budget-capped by the Arbiter)
    /// against the current positions snapshot and correlation matrix.
    pub fn check(
        &self,
        signal: &IntentSignal,
        requested: Decimal,
        positions: &PositionsSnapshot,
        matrix: &CorrelationMatrix,
        engine: &CorrelationEngine,
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> GuardianDecision {
        let delta = positions.net_delta();
        let delta_after = delta + signal.side.sign() * requested;
        let gross_after = positions.gross_notional() + requested;
        let projected_leverage = if equity > Decimal::ZERO {
            (gross_after / equity).to_f64().unwrap_or(f64::INFINITY)
        } else {
            f64::INFINITY
        };
        let matrix_age = matrix.age_secs(now);
        let beta = engine.portfolio_beta(&positions.positions, now);

        let snapshot = RiskSnapshot {
            projected_leverage,
            net_delta: delta_after,
            correlation_peak: 0.0,
            portfolio_beta: beta,
            matrix_age_secs: matrix_age,
        };

        // Fail safe: stale correlation or positions data vetoes everything.
        if matrix_age > self.config.staleness_limit_secs
            || positions.age_secs(now) > self.config.staleness_limit_secs
        {
            tracing::warn!(
                signal_id = %signal.signal_id,
                matrix_age,
                positions_age = positions.age_secs(now),
                "risk data stale, vetoing"
            );
            return GuardianDecision::veto(DecisionReason::StaleRiskData, snapshot);
        }

        // P3 hedge fast-path: a signal that strictly reduces |delta| is
        // approved at the requested size, leverage cap skipped.
        if signal.phase_id == PhaseId::P3 && delta_after.abs() < delta.abs() {
            return GuardianDecision::approve(
                requested,
                DecisionReason::HedgeAutoApprove,
                snapshot,
            );
        }

        // Projected gross leverage against the tier cap.
        let cap = EquityTier::from_equity(equity)
            .max_leverage()
            .to_f64()
            .unwrap_or(0.0);
        if projected_leverage > cap {
            return GuardianDecision::veto(DecisionReason::LeverageCap, snapshot);
        }

        // Net delta bound.
        if equity > Decimal::ZERO {
            let delta_ratio = (delta_after.abs() / equity).to_f64().unwrap_or(f64::INFINITY);
            if delta_ratio > self.config.max_delta_ratio {
                return GuardianDecision::veto(DecisionReason::NetDelta, snapshot);
            }
        }

        // Correlation guard: any same-side position too correlated with the
        // candidate halves the granted size.
        let mut peak: f64 = 0.0;
        // A same-symbol add counts too: rho(s, s) = 1.
        for position in &positions.positions {
            if position.side != signal.side {
                continue;
            }
            if let Some(rho) = matrix.rho(&signal.symbol, &position.symbol) {
                peak = peak.max(rho);
            }
        }
        let snapshot = RiskSnapshot {
            correlation_peak: peak,
            ..snapshot
        };
        if peak > self.config.max_pairwise_correlation {
            let adjusted = requested / Decimal::TWO;
            return GuardianDecision::approve(adjusted, DecisionReason::HighCorrelation, snapshot);
        }

        GuardianDecision::approve(requested, DecisionReason::Ok, snapshot)
    }
}

impl Default for RiskGuardian {
    fn default() -> Self {
        Self::new(GuardianConfig::default())
    }
}
