use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use brain_core::{BrainDecision, DecisionReason, IntentSignal};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::{ApiState, AppError};

/// Wire reply for a decided signal.
#[derive(Debug, Serialize)]
pub struct SignalReply {
    pub approved: bool,
    pub authorised_notional: Decimal,
    pub reason: String,
    pub decision_id: String,
}

impl From<&BrainDecision> for SignalReply {
    fn from(decision: &BrainDecision) -> Self {
        Self {
            approved: decision.approved,
            authorised_notional: decision.authorised_notional,
            reason: decision.reason.as_str().to_string(),
            decision_id: decision.decision_id.clone(),
        }
    }
}

fn is_breaker_reason(reason: DecisionReason) -> bool {
    matches!(
        reason,
        DecisionReason::Cooldown
            | DecisionReason::BreakerDailyDd
            | DecisionReason::BreakerMinEquity
            | DecisionReason::BreakerManual
            | DecisionReason::BreakerTriggered
    )
}

/// `POST /api/signals` — authenticated intent intake.
///
/// 400 malformed, 401 bad signature/timestamp/nonce, 429 rate limited,
/// 503 breaker-tripped or not ready, 200 with the decision otherwise.
pub async fn submit_signal(
    State(state): State<ApiState>,
    Json(signal): Json<IntentSignal>,
) -> Result<Response, AppError> {
    signal.validate().map_err(AppError::from)?;

    if !state.limiter.try_acquire(signal.phase_id) {
        return Err(AppError::RateLimited);
    }

    state
        .signal_auth
        .verify_signal(&signal, Utc::now().timestamp_millis())
        .map_err(AppError::from)?;

    let decision = state.handle.submit(signal).await.map_err(AppError::from)?;
    let reply = SignalReply::from(&decision);

    // Breaker rejections surface as 503 so producers back off.
    let status = if !decision.approved && is_breaker_reason(decision.reason) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "success": true, "data": reply }))).into_response())
}
