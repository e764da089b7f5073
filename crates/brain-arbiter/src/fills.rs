//! Fill ingestion.
//!
//! Fills arrive on a dedicated channel (breaking the Arbiter/Performance
//! cycle): each one feeds the phase trade log, moves equity, refreshes the
//! positions snapshot, ratchets the watermark and re-evaluates the breaker
//! and the sweep condition.

use std::sync::Arc;

use brain_core::FillEvent;
use chrono::Utc;
use notification_service::AlertType;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::mpsc;

use crate::context::BrainContext;

pub fn fill_channel(capacity: usize) -> (mpsc::Sender<FillEvent>, mpsc::Receiver<FillEvent>) {
    mpsc::channel(capacity)
}

/// Consume fills until the channel closes.
pub async fn run_fill_loop(ctx: Arc<BrainContext>, mut rx: mpsc::Receiver<FillEvent>) {
    tracing::info!("fill loop started");
    while let Some(fill) = rx.recv().await {
        handle_fill(&ctx, fill).await;
    }
    tracing::info!("fill loop stopped");
}

pub async fn handle_fill(ctx: &Arc<BrainContext>, fill: FillEvent) {
    // Fills for unknown signals are suspicious but still counted as PnL:
    // the money moved either way.
    if !ctx.decided.contains_key(&fill.signal_id) {
        tracing::warn!(signal_id = %fill.signal_id, "fill for unknown signal");
    }

    ctx.metrics.record_fill();
    ctx.tracker.record(fill.phase_id, fill.pnl, fill.ts);
    if let Err(err) = ctx
        .store
        .record_phase_trade(fill.phase_id, fill.ts, fill.pnl)
        .await
    {
        tracing::error!(error = %err, "failed to persist phase trade");
    }

    // Price tick for the correlation window.
    if let Some(price) = fill.price.to_f64() {
        ctx.correlation.record_price(&fill.symbol, price, fill.ts);
    }

    // Equity moves before any dependent checks run.
    ctx.account.set_equity(fill.equity_after);

    // Positions snapshot: single writer is this loop.
    match ctx.engine.query_positions().await {
        Ok(positions) => ctx.positions.publish(positions, Utc::now()),
        Err(err) => tracing::warn!(error = %err, "positions refresh failed after fill"),
    }

    let now = Utc::now();
    let equity = fill.equity_after;

    // Soft breaker: losing streaks.
    if let Some(event) = ctx.breaker.record_fill(fill.pnl, equity, fill.ts) {
        if let Err(err) = ctx.store.record_breaker_event(&event).await {
            tracing::error!(error = %err, "failed to persist cooldown event");
        }
        if let Err(err) = ctx
            .store
            .save_breaker_state(&ctx.breaker.state(now), ctx.breaker.flatten_pending())
            .await
        {
            tracing::error!(error = %err, "failed to persist breaker state");
        }
    }

    // Hard breaker conditions against fresh equity.
    if let Some(event) = ctx
        .breaker
        .evaluate(equity, ctx.account.start_of_day_equity(), now)
    {
        // evaluate() already transitioned; finish the trip side-effects.
        if let Err(err) = ctx.store.record_breaker_event(&event).await {
            tracing::error!(error = %err, "failed to persist breaker trigger");
        }
        if let Err(err) = ctx
            .store
            .save_breaker_state(&ctx.breaker.state(now), ctx.breaker.flatten_pending())
            .await
        {
            tracing::error!(error = %err, "failed to persist breaker state");
        }
        ctx.notify(AlertType::BreakerTripped {
            reason: event.reason.clone(),
            equity,
        });
        ctx.ensure_flattened().await;
    }

    // Watermark ratchet and treasury bookkeeping.
    let jumped = ctx.capital.equity_jumped(equity).await;
    if ctx.capital.update_watermark(equity).await {
        let snapshot = ctx.capital.snapshot().await;
        if let Err(err) = ctx.store.save_treasury(&snapshot).await {
            tracing::error!(error = %err, "failed to persist treasury state");
        }
    }

    // A >10% equity jump re-evaluates the sweep off-schedule.
    if jumped {
        run_sweep_cycle(ctx, equity).await;
    }
}

/// Evaluate and, when triggered, execute a sweep for the current tier.
pub async fn run_sweep_cycle(ctx: &Arc<BrainContext>, equity: rust_decimal::Decimal) {
    let tier = brain_core::EquityTier::from_equity(equity);
    let Some(plan) = ctx.capital.check_sweep(tier).await else {
        return;
    };
    let now = Utc::now();
    match ctx.capital.execute_sweep(&plan, now).await {
        Ok(op) => {
            if let Err(err) = ctx.store.record_treasury_op(&op).await {
                tracing::error!(error = %err, "failed to persist treasury op");
            }
            let snapshot = ctx.capital.snapshot().await;
            if let Err(err) = ctx.store.save_treasury(&snapshot).await {
                tracing::error!(error = %err, "failed to persist treasury state");
            }
            ctx.notify(AlertType::SweepCompleted {
                amount: op.amount,
                total_swept: snapshot.total_swept,
            });
        }
        Err(err) => {
            ctx.notify(AlertType::SweepFailed {
                amount: plan.amount,
                error: err.to_string(),
            });
        }
    }
}
