//! Shared component wiring.
//!
//! Every global mutable piece (breaker, watermark, correlation matrix,
//! positions snapshot) has exactly one owning component; the context hands
//! out read access and routes mutations through the owners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use allocation_engine::CachedAllocator;
use capital_flow::{CapitalFlowConfig, CapitalFlowManager};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};
use circuit_breaker::{BreakerConfig, CircuitBreaker, HardReason};
use dashmap::DashMap;
use execution_gateway::ExecutionEngine;
use notification_service::{Alert, AlertType, NotificationChannel};
use performance_tracker::PerformanceTracker;
use risk_guardian::{CorrelationEngine, PositionsHandle, PositionsSnapshot, RiskGuardian};
use state_store::BrainStore;

use crate::account::AccountState;
use crate::config::BrainConfig;
use crate::metrics::BrainMetrics;

/// Attempts made for the flatten directive per trip/retry round.
const FLATTEN_ATTEMPTS: u32 = 3;

pub struct BrainContext {
    pub config: BrainConfig,
    pub allocator: CachedAllocator,
    pub tracker: PerformanceTracker,
    pub guardian: RiskGuardian,
    pub correlation: CorrelationEngine,
    pub positions: PositionsHandle,
    pub breaker: CircuitBreaker,
    pub capital: CapitalFlowManager,
    pub store: BrainStore,
    pub engine: Arc<dyn ExecutionEngine>,
    pub notifier: Arc<dyn NotificationChannel>,
    pub metrics: BrainMetrics,
    pub account: AccountState,
    /// Signals are refused until startup recovery completes.
    ready: AtomicBool,
    /// In-memory dedup index over persisted decisions.
    pub(crate) decided: DashMap<String, ()>,
}

impl BrainContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BrainConfig,
        store: BrainStore,
        breaker: CircuitBreaker,
        capital: CapitalFlowManager,
        engine: Arc<dyn ExecutionEngine>,
        notifier: Arc<dyn NotificationChannel>,
        account: AccountState,
    ) -> Self {
        let correlation = CorrelationEngine::new(config.benchmark_symbol.clone());
        Self {
            allocator: CachedAllocator::default(),
            tracker: PerformanceTracker::new(),
            guardian: RiskGuardian::default(),
            correlation,
            positions: PositionsHandle::new(PositionsSnapshot::empty(Utc::now())),
            breaker,
            capital,
            store,
            engine,
            notifier,
            metrics: BrainMetrics::new(),
            account,
            ready: AtomicBool::new(false),
            decided: DashMap::new(),
            config,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Fire-and-forget operator alert.
    pub fn notify(&self, alert_type: AlertType) {
        let notifier = self.notifier.clone();
        let alert = Alert::new(alert_type);
        tokio::spawn(async move {
            if let Err(err) = notifier.send(&alert).await {
                tracing::warn!(error = %err, title = %alert.title, "alert dispatch failed");
            }
        });
    }

    /// Trip the hard breaker: persist the transition, page the operator and
    /// issue the flatten directive. Idempotent while already hard.
    pub async fn trip_hard(&self, reason: HardReason, equity: Decimal, now: DateTime<Utc>) {
        let Some(event) = self.breaker.trigger_hard(reason, equity, now) else {
            return;
        };
        if let Err(err) = self.store.record_breaker_event(&event).await {
            tracing::error!(error = %err, "failed to persist breaker trigger");
        }
        if let Err(err) = self
            .store
            .save_breaker_state(&self.breaker.state(now), self.breaker.flatten_pending())
            .await
        {
            tracing::error!(error = %err, "failed to persist breaker state");
        }
        self.notify(AlertType::BreakerTripped {
            reason: reason.as_str().to_string(),
            equity,
        });
        self.ensure_flattened().await;
    }

    /// Drive the flatten directive while the reset latch is held. Retries a
    /// few times here; the refresh loop keeps calling back while the breaker
    /// stays hard, so a dead engine never clears the latch.
    pub async fn ensure_flattened(&self) {
        if !self.breaker.flatten_pending() {
            return;
        }
        let mut last_err = None;
        for attempt in 0..FLATTEN_ATTEMPTS {
            match self.engine.flatten("breaker_hard").await {
                Ok(()) => {
                    self.breaker.confirm_flatten();
                    if let Err(err) = self
                        .store
                        .save_breaker_state(
                            &self.breaker.state(Utc::now()),
                            self.breaker.flatten_pending(),
                        )
                        .await
                    {
                        tracing::error!(error = %err, "failed to persist flatten completion");
                    }
                    tracing::warn!("flatten confirmed, reset latch released");
                    return;
                }
                Err(err) => {
                    tracing::error!(attempt = attempt + 1, error = %err, "flatten attempt failed");
                    last_err = Some(err);
                }
            }
            if attempt + 1 < FLATTEN_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(250 * (attempt as u64 + 1))).await;
            }
        }
        self.notify(AlertType::FlattenFailed {
            attempts: FLATTEN_ATTEMPTS,
            error: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        });
    }

    /// Symbols the correlation matrix must cover: everything held plus the
    /// benchmark (candidates join via recorded prices as they appear).
    pub fn tracked_symbols(&self) -> Vec<String> {
        let snapshot = self.positions.read();
        let mut symbols: Vec<String> = snapshot
            .positions
            .iter()
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

/// Build the capital flow manager from configuration.
pub fn capital_flow_from_config(
    config: &BrainConfig,
    wallet: Arc<dyn execution_gateway::WalletApi>,
    initial: capital_flow::TreasuryState,
) -> CapitalFlowManager {
    CapitalFlowManager::new(
        CapitalFlowConfig {
            reserve_floor: config.reserve_floor,
            targets: config.tier_targets(),
            ..CapitalFlowConfig::default()
        },
        wallet,
        initial,
    )
}

/// Build the breaker from configuration.
pub fn breaker_from_config(config: &BrainConfig) -> BreakerConfig {
    BreakerConfig {
        daily_drawdown_limit: config.breaker_daily_dd_limit,
        min_equity: config.breaker_min_equity,
        cooldown: chrono::Duration::seconds(config.breaker_cooldown_secs),
        ..BreakerConfig::default()
    }
}
