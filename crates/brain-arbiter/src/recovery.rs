//! Startup recovery.
//!
//! The Brain refuses to serve signals until the last persisted allocation,
//! performance aggregates, watermark and breaker state have been reloaded
//! and the correlation matrix has been recomputed.

use std::sync::Arc;

use anyhow::{Context, Result};
use brain_core::PhaseId;
use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;

use crate::context::BrainContext;

/// Trade history reloaded into the performance tracker.
const TRADE_LOOKBACK_DAYS: i64 = 30;

pub async fn recover(ctx: &Arc<BrainContext>) -> Result<()> {
    let now = Utc::now();
    tracing::info!("startup recovery begun");

    ctx.store
        .init_tables()
        .await
        .context("initializing store tables")?;

    // Trade logs feed the modifier; without them every phase would reset to
    // the neutral default after a restart.
    let since = now - Duration::days(TRADE_LOOKBACK_DAYS);
    for phase in PhaseId::ALL {
        let trades = ctx
            .store
            .load_phase_trades(phase, since)
            .await
            .with_context(|| format!("loading {phase} trade log"))?;
        tracing::info!(phase = %phase, trades = trades.len(), "trade log recovered");
        ctx.tracker.load(phase, trades);
    }

    // Live balances and positions from the engine.
    let balances = ctx
        .engine
        .query_balances()
        .await
        .context("querying balances during recovery")?;
    ctx.account.set_equity(balances.equity);
    ctx.capital
        .observe_balances(balances.risky_balance, balances.safe_balance)
        .await;
    ctx.capital.update_watermark(balances.equity).await;

    match ctx.engine.query_positions().await {
        Ok(positions) => {
            // Seed the price history so the first matrix has anchor points.
            for position in &positions {
                if let Some(price) = position.entry_price.to_f64() {
                    ctx.correlation.record_price(&position.symbol, price, now);
                }
            }
            ctx.positions.publish(positions, now);
        }
        Err(err) => {
            // Guardian fail-safe will veto until a snapshot lands.
            tracing::warn!(error = %err, "positions unavailable during recovery");
        }
    }

    // Start-of-day baseline: reuse today's persisted value, otherwise the
    // current equity opens the day.
    match ctx.store.load_start_of_day_equity().await? {
        Some((equity, day)) if day.date_naive() == now.date_naive() => {
            ctx.account.set_start_of_day(equity, day);
            tracing::info!(%equity, "start-of-day equity restored");
        }
        _ => {
            let baseline = ctx.account.roll_day(now);
            ctx.store
                .save_start_of_day_equity(baseline, now)
                .await
                .context("persisting start-of-day equity")?;
        }
    }

    // Correlation must be fresh before the Guardian will pass anything.
    ctx.correlation.recompute(&ctx.tracked_symbols(), now);

    // Persist the recovered treasury view.
    let treasury = ctx.capital.snapshot().await;
    ctx.store
        .save_treasury(&treasury)
        .await
        .context("persisting recovered treasury")?;

    ctx.mark_ready();
    tracing::info!(
        equity = %balances.equity,
        hwm = %treasury.high_watermark,
        "startup recovery complete, accepting signals"
    );
    Ok(())
}
