use thiserror::Error;

/// Errors crossing crate boundaries inside the Brain.
///
/// Library crates return these where a caller needs to branch on the kind;
/// binaries wrap them in `anyhow` for reporting.
#[derive(Debug, Error)]
pub enum BrainError {
    #[error("malformed signal: {0}")]
    MalformedSignal(String),

    #[error("authentication failure: {0}")]
    AuthFailure(String),

    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("breaker tripped: {0}")]
    BreakerTripped(String),

    #[error("risk data stale")]
    StaleRiskData,

    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("execution engine error: {0}")]
    ExecutionEngine(String),

    #[error("wallet transfer failed: {0}")]
    SweepFailure(String),

    #[error("transfer direction forbidden: {0}")]
    ForbiddenTransfer(String),

    #[error("brain not ready (recovery in progress)")]
    NotReady,

    #[error("rate limited")]
    RateLimited,
}

impl BrainError {
    /// Whether the error maps to a client fault (4xx) at the API boundary.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            BrainError::MalformedSignal(_)
                | BrainError::AuthFailure(_)
                | BrainError::UnknownPhase(_)
                | BrainError::ForbiddenTransfer(_)
                | BrainError::RateLimited
        )
    }
}
