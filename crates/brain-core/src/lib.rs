pub mod error;
pub mod signing;
pub mod types;

pub use error::BrainError;
pub use types::{
    AllocationSnapshot, BrainDecision, DecisionReason, EquityTier, FillEvent, IntentSignal,
    PerformanceSnapshot, PhaseId, Position, RiskSnapshot, Side,
};
