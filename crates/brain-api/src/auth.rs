//! Request authentication.
//!
//! Intent signals carry an HMAC-SHA256 signature over
//! `timestamp_ms|nonce|payload_json`; the engine's fill callbacks sign the
//! raw body the same way. Timestamps older or newer than the tolerance and
//! replayed nonces are rejected before the signature is even checked.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use brain_core::{signing, BrainError, IntentSignal};
use dashmap::DashMap;

use crate::AppError;

/// Accepted clock skew between producer and Brain.
const TIMESTAMP_TOLERANCE_MS: i64 = 300_000;

/// How long a nonce is remembered.
const NONCE_WINDOW_MS: i64 = 300_000;

/// Replay cache is pruned once it grows past this.
const NONCE_PRUNE_THRESHOLD: usize = 4096;

pub struct RequestAuthenticator {
    secret: Vec<u8>,
    /// nonce -> expiry (ms since epoch)
    seen_nonces: DashMap<String, i64>,
}

impl RequestAuthenticator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            seen_nonces: DashMap::new(),
        }
    }

    /// Verify an intent signal end to end.
    pub fn verify_signal(&self, signal: &IntentSignal, now_ms: i64) -> Result<(), BrainError> {
        self.check_timestamp(signal.timestamp_ms, now_ms)?;
        self.check_nonce(&signal.nonce, now_ms)?;
        signing::verify_signal(&self.secret, signal)?;
        self.remember_nonce(&signal.nonce, now_ms);
        Ok(())
    }

    /// Verify a raw signed request (fill callbacks).
    pub fn verify_raw(
        &self,
        timestamp_ms: i64,
        nonce: &str,
        body: &str,
        signature: &str,
        now_ms: i64,
    ) -> Result<(), BrainError> {
        self.check_timestamp(timestamp_ms, now_ms)?;
        self.check_nonce(nonce, now_ms)?;
        signing::verify(
            &self.secret,
            &signing::message(timestamp_ms, nonce, body),
            signature,
        )?;
        self.remember_nonce(nonce, now_ms);
        Ok(())
    }

    fn check_timestamp(&self, timestamp_ms: i64, now_ms: i64) -> Result<(), BrainError> {
        if (now_ms - timestamp_ms).abs() > TIMESTAMP_TOLERANCE_MS {
            return Err(BrainError::AuthFailure(format!(
                "timestamp {timestamp_ms} outside tolerance"
            )));
        }
        Ok(())
    }

    fn check_nonce(&self, nonce: &str, now_ms: i64) -> Result<(), BrainError> {
        if nonce.is_empty() {
            return Err(BrainError::AuthFailure("empty nonce".to_string()));
        }
        if let Some(expiry) = self.seen_nonces.get(nonce) {
            if *expiry > now_ms {
                return Err(BrainError::AuthFailure("nonce replayed".to_string()));
            }
        }
        Ok(())
    }

    fn remember_nonce(&self, nonce: &str, now_ms: i64) {
        if self.seen_nonces.len() > NONCE_PRUNE_THRESHOLD {
            self.seen_nonces.retain(|_, expiry| *expiry > now_ms);
        }
        self.seen_nonces
            .insert(nonce.to_string(), now_ms + NONCE_WINDOW_MS);
    }
}

/// Extract the signed-request headers used by the engine callbacks.
pub fn signed_headers(headers: &HeaderMap) -> Result<(i64, String, String), AppError> {
    let timestamp = headers
        .get("x-brain-timestamp")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| AppError::Auth("missing or invalid x-brain-timestamp".to_string()))?;
    let nonce = headers
        .get("x-brain-nonce")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::Auth("missing x-brain-nonce".to_string()))?;
    let signature = headers
        .get("x-brain-signature")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::Auth("missing x-brain-signature".to_string()))?;
    Ok((timestamp, nonce, signature))
}

/// Middleware guarding the operator surface with a static key.
pub async fn operator_auth_middleware(
    axum::extract::State(state): axum::extract::State<crate::ApiState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = &state.handle.context().config.operator_api_key;
    let provided = headers
        .get("x-operator-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if expected.is_empty() || provided != expected {
        tracing::warn!("operator surface rejected: bad key");
        return Err(AppError::Auth("invalid operator key".to_string()));
    }
    Ok(next.run(request).await)
}
