//! Authenticated operator surface: breaker reset, allocation override,
//! manual treasury transfers.

use allocation_engine::WeightVector;
use axum::extract::State;
use axum::routing::post;
use axum::{middleware, Json, Router};
use chrono::Utc;
use execution_gateway::{BalanceBucket, TransferRequest};
use notification_service::AlertType;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::operator_auth_middleware;
use crate::{ApiResponse, ApiState, AppError};

pub fn routes(state: ApiState) -> Router<ApiState> {
    Router::new()
        .route("/api/operator/breaker/halt", post(halt_trading))
        .route("/api/operator/breaker/reset", post(reset_breaker))
        .route("/api/operator/allocation/override", post(set_allocation_override))
        .route("/api/operator/allocation/clear", post(clear_allocation_override))
        .route("/api/operator/treasury/transfer", post(manual_transfer))
        .layer(middleware::from_fn_with_state(
            state,
            operator_auth_middleware,
        ))
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub operator_id: String,
    pub reason: String,
}

/// Manual halt: goes through the same hard-trip path as the automatic
/// triggers (flatten, persistence, paging).
async fn halt_trading(
    State(state): State<ApiState>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    if request.operator_id.trim().is_empty() {
        return Err(AppError::Malformed("operator_id required".to_string()));
    }
    let ctx = state.handle.context();
    let already_hard = ctx.breaker.state(Utc::now()).severity() >= 2;
    tracing::warn!(
        operator_id = %request.operator_id,
        reason = %request.reason,
        "manual trading halt requested"
    );
    ctx.trip_hard(
        circuit_breaker::HardReason::Manual,
        ctx.account.equity(),
        Utc::now(),
    )
    .await;
    Ok(ApiResponse::success(
        json!({ "state": "hard", "changed": !already_hard }),
    ))
}

async fn reset_breaker(
    State(state): State<ApiState>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    if request.operator_id.trim().is_empty() {
        return Err(AppError::Malformed("operator_id required".to_string()));
    }
    let ctx = state.handle.context();
    let now = Utc::now();
    let equity = ctx.account.equity();

    match ctx
        .breaker
        .reset(&request.operator_id, &request.reason, equity, now)
    {
        Err(err) => Err(AppError::Conflict(err.to_string())),
        Ok(None) => Ok(ApiResponse::success(
            json!({ "changed": false, "state": "normal" }),
        )),
        Ok(Some(event)) => {
            ctx.store
                .record_breaker_event(&event)
                .await
                .map_err(AppError::from)?;
            ctx.store
                .save_breaker_state(&ctx.breaker.state(now), ctx.breaker.flatten_pending())
                .await
                .map_err(AppError::from)?;
            ctx.notify(AlertType::BreakerReset {
                operator_id: request.operator_id.clone(),
                reason: request.reason.clone(),
            });
            Ok(ApiResponse::success(
                json!({ "changed": true, "state": "normal" }),
            ))
        }
    }
}

#[derive(Deserialize)]
pub struct OverrideRequest {
    pub w1: f64,
    pub w2: f64,
    pub w3: f64,
    pub operator_id: String,
}

async fn set_allocation_override(
    State(state): State<ApiState>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let ctx = state.handle.context();
    let vector = WeightVector {
        w1: request.w1,
        w2: request.w2,
        w3: request.w3,
    };
    ctx.allocator
        .set_override(vector, &request.operator_id)
        .map_err(AppError::from)?;

    // The override shows up in allocation history like any other vector.
    let equity = ctx.account.equity();
    let snapshot = ctx.allocator.snapshot(equity);
    ctx.store
        .record_allocation(
            Utc::now(),
            equity,
            snapshot.w1,
            snapshot.w2,
            snapshot.w3,
            snapshot.tier.as_str(),
        )
        .await
        .map_err(AppError::from)?;

    Ok(ApiResponse::success(json!({ "override_active": true })))
}

#[derive(Deserialize)]
pub struct ClearOverrideRequest {
    pub operator_id: String,
}

async fn clear_allocation_override(
    State(state): State<ApiState>,
    Json(request): Json<ClearOverrideRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let ctx = state.handle.context();
    let cleared = ctx.allocator.clear_override(&request.operator_id).is_some();
    Ok(ApiResponse::success(json!({ "cleared": cleared })))
}

#[derive(Deserialize)]
pub struct ManualTransferRequest {
    pub from: BalanceBucket,
    pub to: BalanceBucket,
    pub amount: Decimal,
    pub operator_id: String,
}

async fn manual_transfer(
    State(state): State<ApiState>,
    Json(request): Json<ManualTransferRequest>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let ctx = state.handle.context();

    // Safe -> risky never passes this constructor.
    let transfer = TransferRequest::manual(
        Uuid::new_v4().to_string(),
        request.from,
        request.to,
        request.amount,
    )
    .map_err(AppError::from)?;

    let op = ctx
        .capital
        .manual_transfer(&transfer, &request.operator_id, Utc::now())
        .await
        .map_err(AppError::from)?;
    ctx.store
        .record_treasury_op(&op)
        .await
        .map_err(AppError::from)?;
    let treasury = ctx.capital.snapshot().await;
    ctx.store
        .save_treasury(&treasury)
        .await
        .map_err(AppError::from)?;

    Ok(ApiResponse::success(json!({
        "amount": op.amount,
        "risky_balance": treasury.risky_balance,
        "safe_balance": treasury.safe_balance,
    })))
}
