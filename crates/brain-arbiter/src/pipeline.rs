//! The per-signal decision pipeline.
//!
//! Breaker gate -> allocation snapshot and performance modifier -> budget
//! cap -> Risk Guardian -> persist -> forward. The decision is persisted
//! before any externally observable effect; a breaker trip that lands
//! mid-pipeline aborts work that has not been persisted yet.

use std::sync::Arc;

use brain_core::{
    BrainDecision, BrainError, DecisionReason, IntentSignal, PhaseId,
};
use chrono::Utc;
use notification_service::AlertType;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::context::BrainContext;

/// Backoff between submit retries toward the execution engine.
const SUBMIT_BACKOFF_MS: [u64; 3] = [100, 300, 900];

impl BrainContext {
    /// Produce the at-most-one decision for a signal.
    ///
    /// `Ok` carries the decision (approved or vetoed). `Err` means the Brain
    /// cannot decide right now (not ready, store down) and the originator
    /// should retry; nothing was persisted.
    pub async fn decide(self: &Arc<Self>, signal: IntentSignal) -> Result<BrainDecision, BrainError> {
        if !self.is_ready() {
            return Err(BrainError::NotReady);
        }
        signal.validate()?;

        // Intake dedup: a repeated signal_id is answered from the store.
        if self.decided.contains_key(&signal.signal_id) {
            if let Ok(Some(prior)) = self.store.fetch_decision(&signal.signal_id).await {
                self.metrics.record_duplicate();
                return Ok(prior);
            }
        }

        let now = Utc::now();
        let decision_id = Uuid::new_v4().to_string();

        // 1. Breaker gate.
        if let Err(reason) = self.breaker.gate(now) {
            let decision = BrainDecision::rejected(decision_id, &signal, reason, now);
            self.persist_rejection(&decision).await;
            return Ok(decision);
        }

        // 2. Allocation snapshot and performance modifier.
        let equity = self.account.equity();
        let allocation = self.allocator.snapshot(equity);
        let performance = self.tracker.snapshot_at(signal.phase_id, now);

        // 3. Effective weight, clamped to [0, 1].
        let weight = allocation.weight_for(signal.phase_id);
        let effective = (weight * performance.modifier).clamp(0.0, 1.0);

        // A P3 signal that strictly reduces |delta| skips the budget cap;
        // de-risking is never blocked by its own phase budget.
        let positions = self.positions.read();
        let delta = positions.net_delta();
        let hedge_eligible = signal.phase_id == PhaseId::P3
            && (delta + signal.side.sign() * signal.requested_notional).abs() < delta.abs();

        // 4. Budget cap.
        let budget = equity * Decimal::from_f64_retain(effective).unwrap_or(Decimal::ZERO);
        let requested = if hedge_eligible {
            signal.requested_notional
        } else {
            signal.requested_notional.min(budget)
        };
        if requested <= Decimal::ZERO {
            let mut decision = BrainDecision::rejected(
                decision_id,
                &signal,
                DecisionReason::PhaseBudget,
                now,
            );
            decision.allocation = Some(allocation);
            decision.performance = Some(performance);
            self.persist_rejection(&decision).await;
            return Ok(decision);
        }

        // 5. Risk Guardian on the (possibly reduced) signal.
        let matrix = self.correlation.matrix();
        let verdict = self.guardian.check(
            &signal,
            requested,
            &positions,
            &matrix,
            &self.correlation,
            equity,
            now,
        );

        let decision = BrainDecision {
            decision_id,
            signal_id: signal.signal_id.clone(),
            phase_id: signal.phase_id,
            approved: verdict.approved,
            requested_notional: signal.requested_notional,
            authorised_notional: verdict.authorised,
            reason: verdict.reason,
            allocation: Some(allocation),
            risk: Some(verdict.snapshot),
            performance: Some(performance),
            ts: now,
        };

        // 6. Breaker may have tripped while we were sizing: nothing has been
        // persisted yet, so the pipeline aborts instead of standing by the
        // stale approval.
        if decision.approved && self.breaker.gate(Utc::now()).is_err() {
            let decision = BrainDecision::rejected(
                decision.decision_id,
                &signal,
                DecisionReason::BreakerTriggered,
                Utc::now(),
            );
            self.persist_rejection(&decision).await;
            return Ok(decision);
        }

        // 7. Persist before any side-effect. Approvals must not outrun a
        // degraded store.
        if decision.approved && self.store.is_degraded() {
            return Err(BrainError::StoreUnavailable(
                "store degraded; approvals suspended".to_string(),
            ));
        }
        match self.store.insert_decision(&decision).await {
            Ok(true) => {
                self.decided.insert(decision.signal_id.clone(), ());
            }
            Ok(false) => {
                // Lost a race with a concurrent intake of the same signal.
                self.metrics.record_duplicate();
                if let Ok(Some(prior)) = self.store.fetch_decision(&signal.signal_id).await {
                    return Ok(prior);
                }
                return Ok(decision);
            }
            Err(err) => {
                if decision.approved {
                    return Err(BrainError::StoreUnavailable(err.to_string()));
                }
                tracing::error!(error = %err, signal_id = %signal.signal_id, "failed to persist veto");
                self.decided.insert(decision.signal_id.clone(), ());
                return Ok(decision);
            }
        }

        // Telemetry for guardian-checked decisions.
        if let Some(risk) = &decision.risk {
            let var_95 = self.correlation.var_95(&positions.positions, now);
            let _ = self.store.record_risk_snapshot(now, risk, var_95).await;
        }

        // 8. Forward approvals; the decision is already durable, so the send
        // happens off the hot path and failures are marked, never dropped.
        if decision.approved {
            self.forward(&decision, &signal);
        }

        Ok(decision)
    }

    async fn persist_rejection(&self, decision: &BrainDecision) {
        match self.store.insert_decision(decision).await {
            Ok(true) => {
                self.decided.insert(decision.signal_id.clone(), ());
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(error = %err, signal_id = %decision.signal_id, "failed to persist rejection");
            }
        }
    }

    /// Submit an approved decision to the execution engine with retries.
    fn forward(self: &Arc<Self>, decision: &BrainDecision, signal: &IntentSignal) {
        let ctx = Arc::clone(self);
        let order = execution_gateway::OrderCommand {
            decision_id: decision.decision_id.clone(),
            signal_id: decision.signal_id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            notional: decision.authorised_notional,
        };

        tokio::spawn(async move {
            let mut last_err = None;
            for (attempt, backoff_ms) in std::iter::once(&0u64)
                .chain(SUBMIT_BACKOFF_MS.iter())
                .enumerate()
            {
                if *backoff_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(*backoff_ms)).await;
                }
                match ctx.engine.submit(&order).await {
                    Ok(ack) if ack.accepted => {
                        tracing::debug!(
                            decision_id = %order.decision_id,
                            attempt = attempt + 1,
                            "order forwarded to execution engine"
                        );
                        return;
                    }
                    Ok(_) => last_err = Some(anyhow::anyhow!("engine rejected order")),
                    Err(err) => last_err = Some(err),
                }
            }
            let error = last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::error!(
                decision_id = %order.decision_id,
                error = %error,
                "submit failed after retries, marking SEND_FAILED"
            );
            ctx.metrics.record_send_failure();
            if let Err(err) = ctx
                .store
                .mark_decision_reason(&order.signal_id, DecisionReason::SendFailed.as_str())
                .await
            {
                tracing::error!(error = %err, "failed to mark SEND_FAILED");
            }
            ctx.notify(AlertType::DecisionSendFailed {
                signal_id: order.signal_id.clone(),
                decision_id: order.decision_id.clone(),
                error,
            });
        });
    }
}
