//! Multi-trigger emergency halt.
//!
//! The breaker owns its state; transitions happen only through its methods
//! and follow the severity order (Hard > SoftCooldown > Normal). Triggering
//! at or below the current severity changes nothing and emits no event.

use std::collections::VecDeque;
use std::sync::RwLock;

use anyhow::{bail, Result};
use brain_core::DecisionReason;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

use crate::models::{BreakerEvent, BreakerEventKind, BreakerState, HardReason};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Intraday PnL / start-of-day equity at or below this goes Hard.
    pub daily_drawdown_limit: f64,
    /// Equity below this absolute floor goes Hard.
    pub min_equity: Decimal,
    /// Consecutive losing fills inside the window that trip the soft breaker.
    pub loss_streak: usize,
    pub loss_window: Duration,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            daily_drawdown_limit: -0.15,
            min_equity: Decimal::from(150),
            loss_streak: 3,
            loss_window: Duration::minutes(60),
            cooldown: Duration::minutes(30),
        }
    }
}

struct Inner {
    state: BreakerState,
    /// Timestamps of the current uninterrupted run of losing fills.
    loss_run: VecDeque<DateTime<Utc>>,
    /// Hard entry commands a flatten; reset is latched until it confirms.
    flatten_pending: bool,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                state: BreakerState::Normal,
                loss_run: VecDeque::new(),
                flatten_pending: false,
            }),
        }
    }

    /// Restore persisted state on startup.
    pub fn restore(config: BreakerConfig, state: BreakerState, flatten_pending: bool) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                state,
                loss_run: VecDeque::new(),
                flatten_pending,
            }),
        }
    }

    /// Current state, resolving an expired soft cooldown to Normal.
    pub fn state(&self, now: DateTime<Utc>) -> BreakerState {
        {
            let inner = self.inner.read().expect("breaker lock poisoned");
            match inner.state {
                BreakerState::SoftCooldown { until } if until <= now => {}
                state => return state,
            }
        }
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        if let BreakerState::SoftCooldown { until } = inner.state {
            if until <= now {
                tracing::info!("soft cooldown expired, breaker back to normal");
                inner.state = BreakerState::Normal;
            }
        }
        inner.state
    }

    /// Gate a decision: Ok while Normal, otherwise the rejection code.
    pub fn gate(&self, now: DateTime<Utc>) -> Result<(), DecisionReason> {
        match self.state(now) {
            BreakerState::Normal => Ok(()),
            BreakerState::SoftCooldown { .. } => Err(DecisionReason::Cooldown),
            BreakerState::Hard { reason, .. } => Err(reason.decision_reason()),
        }
    }

    /// Evaluate the hard conditions against fresh equity numbers.
    /// Returns the transition event when one fired.
    pub fn evaluate(
        &self,
        equity: Decimal,
        start_of_day_equity: Decimal,
        now: DateTime<Utc>,
    ) -> Option<BreakerEvent> {
        if equity < self.config.min_equity {
            return self.trigger_hard(HardReason::MinEquity, equity, now);
        }
        if start_of_day_equity > Decimal::ZERO {
            let dd = ((equity - start_of_day_equity) / start_of_day_equity)
                .to_f64()
                .unwrap_or(0.0);
            if dd <= self.config.daily_drawdown_limit {
                return self.trigger_hard(HardReason::DailyDrawdown, equity, now);
            }
        }
        None
    }

    /// Feed a fill outcome into the loss-streak tracker. A run of losing
    /// fills inside the sliding window trips the soft breaker.
    pub fn record_fill(&self, pnl: Decimal, equity: Decimal, ts: DateTime<Utc>) -> Option<BreakerEvent> {
        let streak = {
            let mut inner = self.inner.write().expect("breaker lock poisoned");
            if pnl >= Decimal::ZERO {
                inner.loss_run.clear();
                return None;
            }
            inner.loss_run.push_back(ts);
            let cutoff = ts - self.config.loss_window;
            while let Some(front) = inner.loss_run.front() {
                if *front < cutoff {
                    inner.loss_run.pop_front();
                } else {
                    break;
                }
            }
            inner.loss_run.len()
        };
        if streak >= self.config.loss_streak {
            return self.trigger_soft(equity, ts);
        }
        None
    }

    /// Trip the hard breaker. No-op when already Hard.
    pub fn trigger_hard(
        &self,
        reason: HardReason,
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> Option<BreakerEvent> {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        if inner.state.severity() >= 2 {
            return None;
        }
        let prior = inner.state;
        inner.state = BreakerState::Hard { reason, since: now };
        inner.flatten_pending = true;
        tracing::error!(reason = reason.as_str(), %equity, "hard breaker tripped");
        Some(BreakerEvent {
            ts: now,
            kind: BreakerEventKind::Trigger,
            reason: reason.as_str().to_string(),
            equity,
            operator_id: None,
            context: json!({ "prior_severity": prior.severity(), "hard": true }),
        })
    }

    /// Trip the soft cooldown. No-op at soft or hard severity.
    pub fn trigger_soft(&self, equity: Decimal, now: DateTime<Utc>) -> Option<BreakerEvent> {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        if inner.state.severity() >= 1 {
            // An expired cooldown still counts as Normal here.
            if let BreakerState::SoftCooldown { until } = inner.state {
                if until > now {
                    return None;
                }
            } else {
                return None;
            }
        }
        let until = now + self.config.cooldown;
        inner.state = BreakerState::SoftCooldown { until };
        inner.loss_run.clear();
        tracing::warn!(%equity, %until, "soft cooldown engaged");
        Some(BreakerEvent {
            ts: now,
            kind: BreakerEventKind::Trigger,
            reason: "COOLDOWN".to_string(),
            equity,
            operator_id: None,
            context: json!({ "until": until.to_rfc3339() }),
        })
    }

    /// The flatten directive completed; release the reset latch.
    pub fn confirm_flatten(&self) {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        inner.flatten_pending = false;
    }

    pub fn flatten_pending(&self) -> bool {
        self.inner
            .read()
            .expect("breaker lock poisoned")
            .flatten_pending
    }

    /// Operator reset. No-op in Normal; refused while the flatten directive
    /// issued on the hard trip has not confirmed.
    pub fn reset(
        &self,
        operator_id: &str,
        reason: &str,
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<BreakerEvent>> {
        let mut inner = self.inner.write().expect("breaker lock poisoned");
        if inner.state.is_normal() {
            return Ok(None);
        }
        if inner.flatten_pending {
            bail!("flatten has not completed; breaker stays hard");
        }
        let prior = inner.state;
        inner.state = BreakerState::Normal;
        inner.loss_run.clear();
        tracing::warn!(operator_id, reason, "breaker reset by operator");
        Ok(Some(BreakerEvent {
            ts: now,
            kind: BreakerEventKind::Reset,
            reason: reason.to_string(),
            equity,
            operator_id: Some(operator_id.to_string()),
            context: json!({ "prior_severity": prior.severity() }),
        }))
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
