use brain_core::PhaseId;
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::tracker::PerformanceTracker;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

#[test]
fn modifier_defaults_below_ten_trades() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    for i in 0..9 {
        tracker.record(PhaseId::P1, dec!(10), t0 - Duration::hours(i));
    }
    assert_eq!(tracker.modifier_at(PhaseId::P1, t0), 1.0);
}

#[test]
fn negative_sharpe_floors_modifier() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    for i in 0..20 {
        let pnl = if i % 2 == 0 { dec!(-50) } else { dec!(-10) };
        tracker.record(PhaseId::P2, pnl, t0 - Duration::hours(i));
    }
    assert_eq!(tracker.modifier_at(PhaseId::P2, t0), 0.5);
}

#[test]
fn strong_sharpe_caps_modifier() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    // Consistently positive with mild noise: sharpe far above 2.
    for i in 0..30 {
        let pnl = if i % 3 == 0 { dec!(12) } else { dec!(10) };
        tracker.record(PhaseId::P3, pnl, t0 - Duration::hours(i));
    }
    assert_eq!(tracker.modifier_at(PhaseId::P3, t0), 1.2);
}

#[test]
fn mid_sharpe_interpolates() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    // Alternating wins and losses, small positive mean.
    for i in 0..40 {
        let pnl = if i % 2 == 0 { dec!(11) } else { dec!(-9) };
        tracker.record(PhaseId::P1, pnl, t0 - Duration::hours(i));
    }
    let sharpe = tracker.sharpe_at(PhaseId::P1, 7, t0);
    assert!(sharpe > 0.0 && sharpe < 2.0, "sharpe = {sharpe}");
    let modifier = tracker.modifier_at(PhaseId::P1, t0);
    assert!((modifier - (1.0 + 0.1 * sharpe)).abs() < 1e-12);
}

#[test]
fn zero_variance_yields_zero_sharpe() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    for i in 0..15 {
        tracker.record(PhaseId::P1, dec!(5), t0 - Duration::hours(i));
    }
    assert_eq!(tracker.sharpe_at(PhaseId::P1, 7, t0), 0.0);
    // Count is sufficient but the statistic is untrusted: sharpe 0 maps to 1.0.
    assert_eq!(tracker.modifier_at(PhaseId::P1, t0), 1.0);
}

#[test]
fn window_excludes_old_trades() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    for i in 0..20 {
        tracker.record(PhaseId::P2, dec!(-100), t0 - Duration::days(10) - Duration::hours(i));
    }
    // Losing trades are outside the 7-day window, so the default applies.
    assert_eq!(tracker.modifier_at(PhaseId::P2, t0), 1.0);
    assert_eq!(tracker.trades_in_window(PhaseId::P2, 7, t0), 0);
}

#[test]
fn out_of_order_fills_are_inserted_in_order() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    tracker.record(PhaseId::P1, dec!(1), t0);
    tracker.record(PhaseId::P1, dec!(2), t0 - Duration::hours(2));
    tracker.record(PhaseId::P1, dec!(3), t0 - Duration::hours(1));
    assert_eq!(tracker.trades_in_window(PhaseId::P1, 1, t0), 3);
}

#[test]
fn load_replaces_log_for_recovery() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    let records = (0..12)
        .map(|i| crate::models::TradeRecord {
            ts: t0 - Duration::hours(i),
            pnl: dec!(-5),
        })
        .collect();
    tracker.load(PhaseId::P3, records);
    assert_eq!(tracker.modifier_at(PhaseId::P3, t0), 0.5);
}

#[test]
fn phases_are_independent() {
    let tracker = PerformanceTracker::new();
    let t0 = now();
    for i in 0..20 {
        tracker.record(PhaseId::P1, dec!(-10), t0 - Duration::hours(i));
    }
    assert_eq!(tracker.modifier_at(PhaseId::P1, t0), 0.5);
    assert_eq!(tracker.modifier_at(PhaseId::P2, t0), 1.0);
    assert_eq!(tracker.modifier_at(PhaseId::P3, t0), 1.0);
}

proptest! {
    /// Modifier stays in [0.5, 1.2] and defaults to 1.0 under 10 trades,
    /// for arbitrary pnl sequences.
    #[test]
    fn modifier_bounds_hold(pnls in prop::collection::vec(-1000.0f64..1000.0, 0..60)) {
        let tracker = PerformanceTracker::new();
        let t0 = now();
        for (i, pnl) in pnls.iter().enumerate() {
            let d = Decimal::from_f64_retain(*pnl).unwrap();
            tracker.record(PhaseId::P1, d, t0 - Duration::minutes(i as i64));
        }
        let modifier = tracker.modifier_at(PhaseId::P1, t0);
        prop_assert!((0.5..=1.2).contains(&modifier), "modifier = {}", modifier);
        if pnls.len() < 10 {
            prop_assert_eq!(modifier, 1.0);
        }
    }
}
