//! Egress seams of the Brain: the execution engine that moves orders and the
//! exchange wallet that moves balances. Both sit behind async traits so the
//! Arbiter and Capital Flow Manager never couple to a transport.

pub mod http;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use http::{HttpExecutionClient, HttpWalletClient};
pub use types::{
    AccountBalances, BalanceBucket, OrderCommand, SubmitAck, TransferAck, TransferRequest,
};

use brain_core::Position;

/// Command surface of the downstream execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submit an approved order. Idempotent by decision_id on the engine side.
    async fn submit(&self, order: &OrderCommand) -> Result<SubmitAck>;

    /// Cancel and close everything. Issued on a hard breaker trip.
    async fn flatten(&self, reason: &str) -> Result<()>;

    async fn query_positions(&self) -> Result<Vec<Position>>;

    async fn query_balances(&self) -> Result<AccountBalances>;
}

/// Exchange wallet-transfer surface used by the profit ratchet.
#[async_trait]
pub trait WalletApi: Send + Sync {
    /// Execute a transfer. Idempotent by the request's sweep_id.
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferAck>;
}
