//! One-way profit ratchet from the risky to the safe balance.
//!
//! The manager is the single owner of the treasury counters; every mutation
//! happens through its methods, behind one async lock.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use brain_core::EquityTier;
use chrono::{DateTime, Utc};
use execution_gateway::{TransferRequest, WalletApi};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{SweepPlan, TierTargets, TreasuryOp, TreasuryOpKind, TreasuryState};

#[derive(Debug, Clone)]
pub struct CapitalFlowConfig {
    /// Risky balance can never be swept below this.
    pub reserve_floor: Decimal,
    /// Sweep triggers at target_allocation * trigger_ratio.
    pub trigger_ratio: Decimal,
    pub targets: TierTargets,
    /// Backoff schedule between transfer retries.
    pub retry_backoff: Vec<Duration>,
    /// A fill raising equity this far above the watermark re-evaluates the
    /// sweep outside the daily schedule. 0.1 = +10%.
    pub equity_jump_ratio: Decimal,
}

impl Default for CapitalFlowConfig {
    fn default() -> Self {
        Self {
            reserve_floor: Decimal::from(200),
            trigger_ratio: Decimal::new(12, 1),
            targets: TierTargets::default(),
            retry_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            equity_jump_ratio: Decimal::new(1, 1),
        }
    }
}

pub struct CapitalFlowManager {
    config: CapitalFlowConfig,
    wallet: Arc<dyn WalletApi>,
    state: RwLock<TreasuryState>,
}

impl CapitalFlowManager {
    pub fn new(
        config: CapitalFlowConfig,
        wallet: Arc<dyn WalletApi>,
        mut initial: TreasuryState,
    ) -> Self {
        initial.reserve_floor = config.reserve_floor;
        Self {
            config,
            wallet,
            state: RwLock::new(initial),
        }
    }

    pub async fn snapshot(&self) -> TreasuryState {
        self.state.read().await.clone()
    }

    /// Ratchet the high watermark. Returns true when it moved.
    pub async fn update_watermark(&self, equity: Decimal) -> bool {
        let mut state = self.state.write().await;
        if equity > state.high_watermark {
            state.high_watermark = equity;
            true
        } else {
            false
        }
    }

    /// Refresh balances from an engine `query_balances` read.
    pub async fn observe_balances(&self, risky: Decimal, safe: Decimal) {
        let mut state = self.state.write().await;
        state.risky_balance = risky;
        state.safe_balance = safe;
    }

    /// Whether a fill moved equity far enough above the watermark to warrant
    /// an off-schedule sweep evaluation.
    pub async fn equity_jumped(&self, equity: Decimal) -> bool {
        let state = self.state.read().await;
        if state.high_watermark <= Decimal::ZERO {
            return false;
        }
        equity > state.high_watermark * (Decimal::ONE + self.config.equity_jump_ratio)
    }

    /// Evaluate the sweep condition for the current tier.
    ///
    /// Triggers when risky >= target * ratio; the amount is the excess over
    /// that threshold, clamped so the remaining risky balance stays at or
    /// above the reserve floor.
    pub async fn check_sweep(&self, tier: EquityTier) -> Option<SweepPlan> {
        let state = self.state.read().await;
        let target = self.config.targets.for_tier(tier);
        let threshold = target * self.config.trigger_ratio;
        if state.risky_balance < threshold {
            return None;
        }
        let mut amount = state.risky_balance - threshold;
        let sweepable = state.risky_balance - state.reserve_floor;
        if amount > sweepable {
            amount = sweepable;
        }
        if amount <= Decimal::ZERO {
            return None;
        }
        Some(SweepPlan {
            sweep_id: Uuid::new_v4().to_string(),
            amount,
            target_allocation: target,
        })
    }

    /// Run a planned sweep through the wallet, retrying on failure.
    ///
    /// Counters move only after the transfer succeeds; a persistent failure
    /// leaves `total_swept` and both balances untouched.
    pub async fn execute_sweep(&self, plan: &SweepPlan, now: DateTime<Utc>) -> Result<TreasuryOp> {
        let request = TransferRequest::sweep(plan.sweep_id.clone(), plan.amount);
        self.transfer_with_retry(&request).await.with_context(|| {
            format!(
                "sweep {} of {} failed after retries",
                plan.sweep_id, plan.amount
            )
        })?;

        let mut state = self.state.write().await;
        state.risky_balance -= plan.amount;
        state.safe_balance += plan.amount;
        state.total_swept += plan.amount;
        debug_assert!(state.risky_balance >= state.reserve_floor);
        tracing::info!(
            sweep_id = %plan.sweep_id,
            amount = %plan.amount,
            risky = %state.risky_balance,
            safe = %state.safe_balance,
            total_swept = %state.total_swept,
            "sweep completed"
        );
        Ok(TreasuryOp {
            ts: now,
            kind: TreasuryOpKind::Sweep,
            amount: plan.amount,
            from: "risky".to_string(),
            to: "safe".to_string(),
            post_hwm: state.high_watermark,
            reason: format!("ratchet above target {}", plan.target_allocation),
        })
    }

    /// Operator-initiated transfer. The request type already forbids
    /// safe -> risky, so only the risky -> safe leg mutates balances here.
    pub async fn manual_transfer(
        &self,
        request: &TransferRequest,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TreasuryOp> {
        self.transfer_with_retry(request)
            .await
            .with_context(|| format!("manual transfer {} failed", request.sweep_id))?;

        let mut state = self.state.write().await;
        state.risky_balance -= request.amount;
        state.safe_balance += request.amount;
        tracing::info!(
            operator_id,
            amount = %request.amount,
            "manual treasury transfer completed"
        );
        Ok(TreasuryOp {
            ts: now,
            kind: TreasuryOpKind::Manual,
            amount: request.amount,
            from: request.from.as_str().to_string(),
            to: request.to.as_str().to_string(),
            post_hwm: state.high_watermark,
            reason: format!("manual transfer by {operator_id}"),
        })
    }

    async fn transfer_with_retry(&self, request: &TransferRequest) -> Result<()> {
        let attempts = self.config.retry_backoff.len() + 1;
        let mut last_err = None;
        for attempt in 0..attempts {
            match self.wallet.transfer(request).await {
                Ok(ack) if ack.completed => return Ok(()),
                Ok(ack) => {
                    last_err = Some(anyhow::anyhow!(
                        "wallet rejected transfer {}",
                        ack.sweep_id
                    ));
                }
                Err(err) => {
                    tracing::warn!(
                        sweep_id = %request.sweep_id,
                        attempt = attempt + 1,
                        error = %err,
                        "wallet transfer attempt failed"
                    );
                    last_err = Some(err);
                }
            }
            if attempt < self.config.retry_backoff.len() {
                tokio::time::sleep(self.config.retry_backoff[attempt]).await;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("transfer failed")))
    }
}
