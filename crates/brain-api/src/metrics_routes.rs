//! Liveness and observability endpoints.

use axum::extract::State;
use axum::Json;
use brain_arbiter::metrics::MetricsSnapshot;
use capital_flow::TreasuryState;
use chrono::Utc;
use circuit_breaker::BreakerState;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use crate::ApiState;

pub async fn health(State(state): State<ApiState>) -> Json<Value> {
    let ctx = state.handle.context();
    let degraded = ctx.store.is_degraded();
    let status = if !ctx.is_ready() {
        "recovering"
    } else if degraded {
        "degraded"
    } else {
        "ok"
    };
    Json(json!({
        "status": status,
        "ready": ctx.is_ready(),
        "store_degraded": degraded,
    }))
}

#[derive(Serialize)]
pub struct MetricsReport {
    pub arbiter: MetricsSnapshot,
    pub breaker_state: &'static str,
    pub breaker_gauge: u8,
    pub correlation_age_secs: i64,
    pub equity: Decimal,
    pub open_positions: usize,
    pub treasury: TreasuryState,
    pub store_degraded: bool,
    pub ready: bool,
}

pub async fn metrics(State(state): State<ApiState>) -> Json<MetricsReport> {
    let ctx = state.handle.context();
    let now = Utc::now();
    let breaker = ctx.breaker.state(now);
    let breaker_state = match breaker {
        BreakerState::Normal => "normal",
        BreakerState::SoftCooldown { .. } => "soft_cooldown",
        BreakerState::Hard { .. } => "hard",
    };
    Json(MetricsReport {
        arbiter: ctx.metrics.snapshot(),
        breaker_state,
        breaker_gauge: breaker.as_gauge(),
        correlation_age_secs: ctx.correlation.matrix().age_secs(now),
        equity: ctx.account.equity(),
        open_positions: ctx.positions.read().positions.len(),
        treasury: ctx.capital.snapshot().await,
        store_degraded: ctx.store.is_degraded(),
        ready: ctx.is_ready(),
    })
}
