pub mod manager;
pub mod models;

pub use manager::{CapitalFlowConfig, CapitalFlowManager};
pub use models::{SweepPlan, TierTargets, TreasuryOp, TreasuryOpKind, TreasuryState};
