//! Equity-dependent capital weighting.
//!
//! Pure functions of equity. Smooth logistic ramps blend phases in as the
//! account grows; the Micro and Medium tiers pin fixed vectors.

use brain_core::EquityTier;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// P3's share of the book can never exceed 80%.
const P3_CEILING: f64 = 0.8;

/// Normalized phase weight vector. Components sum to 1 within 1e-9.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub w1: f64,
    pub w2: f64,
    pub w3: f64,
}

impl WeightVector {
    pub fn sum(&self) -> f64 {
        self.w1 + self.w2 + self.w3
    }

    pub fn get(&self, index: usize) -> f64 {
        match index {
            0 => self.w1,
            1 => self.w2,
            _ => self.w3,
        }
    }

    /// Whether this is a valid allocation vector (unit sum, components in [0,1]).
    pub fn is_valid(&self) -> bool {
        let in_range =
            |w: f64| (0.0..=1.0 + 1e-9).contains(&w);
        in_range(self.w1)
            && in_range(self.w2)
            && in_range(self.w3)
            && (self.sum() - 1.0).abs() <= 1e-9
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Logistic ramp centered at `centre`, effectively spanning `width`.
fn ramp(e: f64, centre: f64, width: f64) -> f64 {
    sigmoid((e - centre) * 4.0 / width).clamp(0.0, 1.0)
}

/// Equity tier for the given account equity.
pub fn tier(equity: Decimal) -> EquityTier {
    EquityTier::from_equity(equity)
}

/// Leverage cap for the given account equity.
pub fn max_leverage(equity: Decimal) -> Decimal {
    tier(equity).max_leverage()
}

/// Map equity to the phase weight vector.
///
/// - Micro (< 1500): all capital on P1.
/// - The P2 ramp runs over [1500, 5000] (half-point 3250).
/// - Medium [5000, 25000): pinned at (0.2, 0.8, 0).
/// - The P3 ramp starts at 25000 with half-point 37500, fully engaged by
///   50000, and P3 holds at most 80% of the book.
pub fn weights(equity: Decimal) -> WeightVector {
    let t = tier(equity);
    match t {
        EquityTier::Micro => WeightVector {
            w1: 1.0,
            w2: 0.0,
            w3: 0.0,
        },
        EquityTier::Medium => WeightVector {
            w1: 0.2,
            w2: 0.8,
            w3: 0.0,
        },
        _ => {
            let e = equity.to_f64().unwrap_or(0.0);
            let t12 = ramp(e, 3250.0, 3500.0);
            let t23 = ramp(e, 37500.0, 25000.0);

            let raw1 = 1.0 - t12;
            let raw2 = t12 * (1.0 - t23);
            let raw3 = t12 * t23 * P3_CEILING;

            normalize(raw1, raw2, raw3)
        }
    }
}

/// Renormalize raw weights to unit sum and enforce the P3 ceiling, pushing
/// any excess back onto P1/P2 in proportion to their mass.
fn normalize(raw1: f64, raw2: f64, raw3: f64) -> WeightVector {
    let sum = raw1 + raw2 + raw3;
    if sum <= f64::EPSILON {
        return WeightVector {
            w1: 1.0,
            w2: 0.0,
            w3: 0.0,
        };
    }

    let mut w1 = raw1 / sum;
    let mut w2 = raw2 / sum;
    let mut w3 = raw3 / sum;

    if w3 > P3_CEILING {
        let excess = w3 - P3_CEILING;
        w3 = P3_CEILING;
        let lower = w1 + w2;
        if lower > f64::EPSILON {
            w1 += excess * w1 / lower;
            w2 += excess * w2 / lower;
        } else {
            w2 += excess;
        }
    }

    // Kill residual floating point drift so the unit-sum invariant holds exactly.
    let total = w1 + w2 + w3;
    WeightVector {
        w1: w1 / total,
        w2: w2 / total,
        w3: w3 / total,
    }
}
