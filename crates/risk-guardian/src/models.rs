use brain_core::{DecisionReason, RiskSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of a Guardian check.
///
/// `authorised` carries the size the Guardian grants: the full requested
/// amount on a clean pass or hedge fast-path, half of it under the
/// correlation guard, zero on a veto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianDecision {
    pub approved: bool,
    pub authorised: Decimal,
    pub reason: DecisionReason,
    pub snapshot: RiskSnapshot,
}

impl GuardianDecision {
    pub fn veto(reason: DecisionReason, snapshot: RiskSnapshot) -> Self {
        Self {
            approved: false,
            authorised: Decimal::ZERO,
            reason,
            snapshot,
        }
    }

    pub fn approve(authorised: Decimal, reason: DecisionReason, snapshot: RiskSnapshot) -> Self {
        Self {
            approved: true,
            authorised,
            reason,
            snapshot,
        }
    }
}
