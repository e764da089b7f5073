//! Transport layer of the Brain: signed signal ingress, the operator
//! surface and observability endpoints.

pub mod auth;
pub mod fill_routes;
pub mod metrics_routes;
pub mod operator_routes;
pub mod rate_limit;
pub mod request_id;
pub mod signal_routes;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use brain_arbiter::ArbiterHandle;
use brain_core::{BrainError, FillEvent};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::RequestAuthenticator;
use crate::rate_limit::PhaseRateLimiter;

/// Everything the routes need, cheap to clone per request.
#[derive(Clone)]
pub struct ApiState {
    pub handle: ArbiterHandle,
    pub fill_tx: mpsc::Sender<FillEvent>,
    pub signal_auth: Arc<RequestAuthenticator>,
    pub engine_auth: Arc<RequestAuthenticator>,
    pub limiter: Arc<PhaseRateLimiter>,
}

impl ApiState {
    pub fn new(handle: ArbiterHandle, fill_tx: mpsc::Sender<FillEvent>) -> Self {
        let config = &handle.context().config;
        let signal_auth = Arc::new(RequestAuthenticator::new(
            config.signal_secret.as_bytes().to_vec(),
        ));
        let engine_auth = Arc::new(RequestAuthenticator::new(
            config.engine_secret.as_bytes().to_vec(),
        ));
        let limiter = Arc::new(PhaseRateLimiter::new(config.rate_limit_per_phase));
        Self {
            handle,
            fill_tx,
            signal_auth,
            engine_auth,
            limiter,
        }
    }
}

/// Uniform success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Error surface of the API, mapped onto the status codes the ingress
/// contract promises.
#[derive(Debug)]
pub enum AppError {
    Malformed(String),
    Auth(String),
    RateLimited,
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<BrainError> for AppError {
    fn from(err: BrainError) -> Self {
        match &err {
            BrainError::MalformedSignal(m) => AppError::Malformed(m.clone()),
            BrainError::UnknownPhase(p) => AppError::Malformed(format!("unknown phase '{p}'")),
            BrainError::AuthFailure(m) => AppError::Auth(m.clone()),
            BrainError::RateLimited => AppError::RateLimited,
            BrainError::ForbiddenTransfer(m) => AppError::Malformed(m.clone()),
            BrainError::NotReady => AppError::Unavailable("recovery in progress".to_string()),
            BrainError::StoreUnavailable(m) => AppError::Unavailable(m.clone()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Malformed(m) => (StatusCode::BAD_REQUEST, m),
            AppError::Auth(m) => (StatusCode::UNAUTHORIZED, m),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m),
            AppError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            AppError::Internal(m) => {
                tracing::error!(error = %m, "internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

pub fn build_router(state: ApiState) -> Router {
    let operator = operator_routes::routes(state.clone());

    Router::new()
        .route("/health", get(metrics_routes::health))
        .route("/api/metrics", get(metrics_routes::metrics))
        .route("/api/signals", post(signal_routes::submit_signal))
        .route("/api/fills", post(fill_routes::ingest_fill))
        .merge(operator)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until the process is told to stop.
pub async fn run_server(state: ApiState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "brain API listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
