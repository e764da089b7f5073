//! Read-synchronized snapshot of the execution engine's open positions.
//!
//! Single writer (the fill handler) publishes a fresh snapshot; Guardian
//! readers grab the current `Arc` without blocking the writer.

use std::sync::{Arc, RwLock};

use brain_core::Position;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct PositionsSnapshot {
    pub positions: Vec<Position>,
    pub as_of: DateTime<Utc>,
}

impl PositionsSnapshot {
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self {
            positions: Vec::new(),
            as_of,
        }
    }

    /// Gross notional: sum of |notional| across open positions.
    pub fn gross_notional(&self) -> Decimal {
        self.positions.iter().map(|p| p.notional.abs()).sum()
    }

    /// Net delta: signed notional sum (long positive, short negative).
    pub fn net_delta(&self) -> Decimal {
        self.positions.iter().map(|p| p.signed_notional()).sum()
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.as_of).num_seconds()
    }
}

/// Shared handle: publish-once, read-many.
#[derive(Clone)]
pub struct PositionsHandle {
    inner: Arc<RwLock<Arc<PositionsSnapshot>>>,
}

impl PositionsHandle {
    pub fn new(initial: PositionsSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Swap in a new snapshot. Called only by the fill handler.
    pub fn publish(&self, positions: Vec<Position>, as_of: DateTime<Utc>) {
        let snapshot = Arc::new(PositionsSnapshot { positions, as_of });
        *self.inner.write().expect("positions lock poisoned") = snapshot;
    }

    pub fn read(&self) -> Arc<PositionsSnapshot> {
        self.inner.read().expect("positions lock poisoned").clone()
    }
}
