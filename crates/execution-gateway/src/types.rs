use brain_core::{BrainError, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An approved order on its way to the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommand {
    pub decision_id: String,
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub notional: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAck {
    pub decision_id: String,
    pub accepted: bool,
    pub engine_order_id: Option<String>,
}

/// Balances as the engine reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalances {
    pub equity: Decimal,
    pub risky_balance: Decimal,
    pub safe_balance: Decimal,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceBucket {
    Risky,
    Safe,
}

impl BalanceBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceBucket::Risky => "risky",
            BalanceBucket::Safe => "safe",
        }
    }
}

/// A wallet transfer. Construction enforces the one-way ratchet: money moves
/// risky -> safe; the reverse direction never leaves the Brain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sweep_id: String,
    pub from: BalanceBucket,
    pub to: BalanceBucket,
    pub amount: Decimal,
}

impl TransferRequest {
    /// A sweep: risky -> safe.
    pub fn sweep(sweep_id: String, amount: Decimal) -> Self {
        Self {
            sweep_id,
            from: BalanceBucket::Risky,
            to: BalanceBucket::Safe,
            amount,
        }
    }

    /// Validated manual transfer. Safe -> risky is always rejected.
    pub fn manual(
        sweep_id: String,
        from: BalanceBucket,
        to: BalanceBucket,
        amount: Decimal,
    ) -> Result<Self, BrainError> {
        if from == BalanceBucket::Safe && to == BalanceBucket::Risky {
            return Err(BrainError::ForbiddenTransfer(
                "safe -> risky transfers are not permitted".to_string(),
            ));
        }
        if from == to {
            return Err(BrainError::ForbiddenTransfer(
                "transfer buckets must differ".to_string(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(BrainError::MalformedSignal(format!(
                "non-positive transfer amount {amount}"
            )));
        }
        Ok(Self {
            sweep_id,
            from,
            to,
            amount,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAck {
    pub sweep_id: String,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn safe_to_risky_is_always_rejected() {
        let err = TransferRequest::manual(
            "m-1".to_string(),
            BalanceBucket::Safe,
            BalanceBucket::Risky,
            dec!(100),
        );
        assert!(err.is_err());
    }

    #[test]
    fn risky_to_safe_manual_is_allowed() {
        let req = TransferRequest::manual(
            "m-2".to_string(),
            BalanceBucket::Risky,
            BalanceBucket::Safe,
            dec!(100),
        )
        .unwrap();
        assert_eq!(req.from, BalanceBucket::Risky);
        assert_eq!(req.to, BalanceBucket::Safe);
    }

    #[test]
    fn zero_amount_is_rejected() {
        assert!(TransferRequest::manual(
            "m-3".to_string(),
            BalanceBucket::Risky,
            BalanceBucket::Safe,
            dec!(0),
        )
        .is_err());
    }
}
