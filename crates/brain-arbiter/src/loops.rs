//! Background maintenance loops, independent of signal dispatch.

use std::sync::Arc;

use brain_core::PhaseId;
use chrono::{Duration as ChronoDuration, Utc};
use notification_service::AlertType;
use rust_decimal::Decimal;
use tokio::time::{self, Duration};

use crate::context::BrainContext;
use crate::fills::run_sweep_cycle;

/// Every 60 s: allocation cache, modifiers, correlation staleness, breaker
/// conditions, store health.
pub async fn run_refresh_loop(ctx: Arc<BrainContext>) {
    let mut interval = time::interval(Duration::from_secs(ctx.config.refresh_interval_secs));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    tracing::info!("metric refresh loop started");
    loop {
        interval.tick().await;
        refresh_once(&ctx).await;
    }
}

pub async fn refresh_once(ctx: &Arc<BrainContext>) {
    let now = Utc::now();

    // Equity drift correction against the engine's view of the account.
    match ctx.engine.query_balances().await {
        Ok(balances) => {
            ctx.account.set_equity(balances.equity);
            ctx.capital
                .observe_balances(balances.risky_balance, balances.safe_balance)
                .await;
        }
        Err(err) => tracing::warn!(error = %err, "balance refresh failed"),
    }

    let equity = ctx.account.equity();

    // Allocation cache and history.
    ctx.allocator.invalidate();
    let allocation = ctx.allocator.snapshot(equity);
    if let Err(err) = ctx
        .store
        .record_allocation(
            now,
            equity,
            allocation.w1,
            allocation.w2,
            allocation.w3,
            allocation.tier.as_str(),
        )
        .await
    {
        tracing::error!(error = %err, "failed to persist allocation history");
    }

    // Modifier gauges.
    let modifiers = [
        ctx.tracker.modifier_at(PhaseId::P1, now),
        ctx.tracker.modifier_at(PhaseId::P2, now),
        ctx.tracker.modifier_at(PhaseId::P3, now),
    ];
    ctx.metrics.set_modifiers(modifiers);

    // Correlation recompute (the engine enforces the 5-minute floor).
    ctx.correlation.maybe_recompute(&ctx.tracked_symbols(), now);

    // Breaker conditions against current equity.
    if let Some(event) = ctx
        .breaker
        .evaluate(equity, ctx.account.start_of_day_equity(), now)
    {
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
    }

    // A pending flatten is retried every pass; the breaker stays hard until
    // it confirms.
    ctx.ensure_flattened().await;

    // Store health: drain buffered telemetry when possible.
    if ctx.store.is_degraded() {
        match ctx.store.flush_buffer().await {
            Ok(flushed) if flushed > 0 => {
                tracing::info!(flushed, "store recovered");
            }
            Ok(_) => {}
            Err(_) => {
                ctx.notify(AlertType::StoreDegraded {
                    buffered_events: ctx.store.buffered_events().await,
                });
            }
        }
    }
}

/// Daily 00:00 UTC tick: roll the trading day, persist performance
/// aggregates, evaluate the sweep and send the operator report.
pub async fn run_daily_loop(ctx: Arc<BrainContext>) {
    tracing::info!("daily schedule loop started");
    loop {
        let now = Utc::now();
        let next_midnight = (now + ChronoDuration::days(1))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists")
            .and_utc();
        let wait = (next_midnight - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60));
        time::sleep(wait).await;
        daily_tick(&ctx).await;
    }
}

pub async fn daily_tick(ctx: &Arc<BrainContext>) {
    let now = Utc::now();
    let equity = ctx.account.equity();
    tracing::info!(%equity, "daily tick");

    // New trading day baseline for the drawdown breaker.
    let baseline = ctx.account.roll_day(now);
    if let Err(err) = ctx.store.save_start_of_day_equity(baseline, now).await {
        tracing::error!(error = %err, "failed to persist start-of-day equity");
    }

    // Scheduled performance persistence (reads always recompute; this is the
    // 24 h bookkeeping pass).
    let aggregates = ctx.tracker.aggregates_at(now);
    if let Err(err) = ctx.store.record_phase_performance(&aggregates, now).await {
        tracing::error!(error = %err, "failed to persist phase performance");
    }

    // Scheduled sweep evaluation.
    run_sweep_cycle(ctx, equity).await;

    // Operator report.
    let (total, approved) = match ctx.store.decision_counts_by_phase().await {
        Ok(rows) => rows
            .iter()
            .fold((0u64, 0u64), |(t, a), (_, rt, ra)| {
                (t + *rt as u64, a + *ra as u64)
            }),
        Err(_) => (0, 0),
    };
    let treasury = ctx.capital.snapshot().await;
    let realized: Decimal = aggregates
        .iter()
        .map(|a| {
            Decimal::from_f64_retain(a.mean_pnl * a.trades_in_window as f64)
                .unwrap_or(Decimal::ZERO)
        })
        .sum();
    ctx.notify(AlertType::DailyReport {
        date: now.format("%Y-%m-%d").to_string(),
        realized_pnl: realized.round_dp(2),
        decisions_total: total,
        decisions_approved: approved,
        equity,
        total_swept: treasury.total_swept,
    });
}
