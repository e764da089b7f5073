use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use brain_core::FillEvent;
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::signed_headers;
use crate::{ApiState, AppError};

/// `POST /api/fills` — fill confirmations pushed by the execution engine,
/// signed with the engine secret over the raw body.
pub async fn ingest_fill(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let (timestamp_ms, nonce, signature) = signed_headers(&headers)?;
    let body_str = std::str::from_utf8(&body)
        .map_err(|_| AppError::Malformed("body is not utf-8".to_string()))?;

    state
        .engine_auth
        .verify_raw(
            timestamp_ms,
            &nonce,
            body_str,
            &signature,
            Utc::now().timestamp_millis(),
        )
        .map_err(AppError::from)?;

    let fill: FillEvent = serde_json::from_str(body_str)
        .map_err(|e| AppError::Malformed(format!("invalid fill: {e}")))?;

    state
        .fill_tx
        .send(fill)
        .await
        .map_err(|_| AppError::Unavailable("fill channel closed".to_string()))?;

    Ok(Json(json!({ "success": true })))
}
