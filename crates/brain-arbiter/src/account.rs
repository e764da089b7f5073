use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::RwLock;

struct AccountInner {
    equity: Decimal,
    start_of_day_equity: Decimal,
    day: DateTime<Utc>,
}

/// Equity view shared across the pipeline. Written by the fill handler and
/// the daily tick; read everywhere.
pub struct AccountState {
    inner: RwLock<AccountInner>,
}

impl AccountState {
    pub fn new(equity: Decimal, start_of_day_equity: Decimal, day: DateTime<Utc>) -> Self {
        Self {
            inner: RwLock::new(AccountInner {
                equity,
                start_of_day_equity,
                day,
            }),
        }
    }

    pub fn equity(&self) -> Decimal {
        self.inner.read().expect("account lock poisoned").equity
    }

    pub fn start_of_day_equity(&self) -> Decimal {
        self.inner
            .read()
            .expect("account lock poisoned")
            .start_of_day_equity
    }

    pub fn set_equity(&self, equity: Decimal) {
        self.inner.write().expect("account lock poisoned").equity = equity;
    }

    /// Restore a persisted day baseline (startup recovery).
    pub fn set_start_of_day(&self, equity: Decimal, day: DateTime<Utc>) {
        let mut inner = self.inner.write().expect("account lock poisoned");
        inner.start_of_day_equity = equity;
        inner.day = day;
    }

    /// Roll the trading day: current equity becomes the new day's baseline.
    pub fn roll_day(&self, day: DateTime<Utc>) -> Decimal {
        let mut inner = self.inner.write().expect("account lock poisoned");
        inner.start_of_day_equity = inner.equity;
        inner.day = day;
        inner.start_of_day_equity
    }

    pub fn day(&self) -> DateTime<Utc> {
        self.inner.read().expect("account lock poisoned").day
    }
}
