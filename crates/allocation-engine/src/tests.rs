use brain_core::EquityTier;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::cache::CachedAllocator;
use crate::engine::{max_leverage, tier, weights, WeightVector};

#[test]
fn micro_tier_is_all_p1() {
    let w = weights(dec!(800));
    assert_eq!(w.w1, 1.0);
    assert_eq!(w.w2, 0.0);
    assert_eq!(w.w3, 0.0);
    assert_eq!(tier(dec!(800)), EquityTier::Micro);
    assert_eq!(max_leverage(dec!(800)), dec!(20));
}

#[test]
fn medium_tier_is_pinned() {
    for equity in [dec!(5000), dec!(10000), dec!(24999.99)] {
        let w = weights(equity);
        assert_eq!(w.w1, 0.2);
        assert_eq!(w.w2, 0.8);
        assert_eq!(w.w3, 0.0);
    }
}

#[test]
fn small_tier_ramps_p2_in() {
    let low = weights(dec!(1500));
    let mid = weights(dec!(3250));
    let high = weights(dec!(4999));
    assert!(low.w2 < mid.w2 && mid.w2 < high.w2);
    assert!(low.w1 > mid.w1 && mid.w1 > high.w1);
    // Half-point of the ramp sits at 3250.
    assert!((mid.w2 - mid.w1).abs() < 0.05);
}

#[test]
fn large_tier_engages_p3() {
    let w = weights(dec!(30000));
    assert!(w.w3 > 0.0 && w.w3 < 0.8);
    assert!(w.w2 > w.w3);
    let further = weights(dec!(45000));
    assert!(further.w3 > w.w3);
}

#[test]
fn institutional_caps_p3_at_80_percent() {
    for equity in [dec!(50000), dec!(100000), dec!(1000000)] {
        let w = weights(equity);
        assert!(w.w3 <= 0.8 + 1e-9, "w3 = {} at equity {}", w.w3, equity);
        assert!((w.sum() - 1.0).abs() <= 1e-9);
    }
}

#[test]
fn cache_serves_override_when_active() {
    let allocator = CachedAllocator::default();
    let ov = WeightVector {
        w1: 0.5,
        w2: 0.5,
        w3: 0.0,
    };
    allocator.set_override(ov, "ops-1").unwrap();
    let snap = allocator.snapshot(dec!(800));
    assert!(snap.override_active);
    assert_eq!(snap.w1, 0.5);
    assert_eq!(snap.w2, 0.5);

    allocator.clear_override("ops-1").unwrap();
    let snap = allocator.snapshot(dec!(800));
    assert!(!snap.override_active);
    assert_eq!(snap.w1, 1.0);
}

#[test]
fn invalid_override_is_rejected() {
    let allocator = CachedAllocator::default();
    let bad = WeightVector {
        w1: 0.7,
        w2: 0.7,
        w3: 0.0,
    };
    assert!(allocator.set_override(bad, "ops-1").is_err());
    assert!(!allocator.override_active());
}

#[test]
fn cache_tracks_equity_changes() {
    let allocator = CachedAllocator::default();
    let micro = allocator.snapshot(dec!(800));
    assert_eq!(micro.tier, EquityTier::Micro);
    // A different equity must not be served from the stale entry.
    let medium = allocator.snapshot(dec!(10000));
    assert_eq!(medium.tier, EquityTier::Medium);
    assert_eq!(medium.w2, 0.8);
}

proptest! {
    /// Weights always form a unit vector with components in [0, 1].
    #[test]
    fn weights_always_normalized(equity in 0.0f64..10_000_000.0) {
        let w = weights(Decimal::from_f64_retain(equity).unwrap());
        prop_assert!((w.sum() - 1.0).abs() <= 1e-9, "sum = {}", w.sum());
        for i in 0..3 {
            prop_assert!((0.0..=1.0 + 1e-9).contains(&w.get(i)), "w{} = {}", i + 1, w.get(i));
        }
        prop_assert!(w.w3 <= 0.8 + 1e-9);
    }

    /// Tier boundaries match the table exactly.
    #[test]
    fn tier_matches_boundary_table(equity in 0.0f64..200_000.0) {
        let d = Decimal::from_f64_retain(equity).unwrap();
        let expected = if d < dec!(1500) {
            EquityTier::Micro
        } else if d < dec!(5000) {
            EquityTier::Small
        } else if d < dec!(25000) {
            EquityTier::Medium
        } else if d < dec!(50000) {
            EquityTier::Large
        } else {
            EquityTier::Institutional
        };
        prop_assert_eq!(tier(d), expected);
    }
}
