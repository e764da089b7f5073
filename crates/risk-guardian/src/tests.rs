use brain_core::{DecisionReason, IntentSignal, PhaseId, Position, Side};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::correlation::{CorrelationEngine, CorrelationMatrix};
use crate::guardian::{GuardianConfig, RiskGuardian};
use crate::positions::PositionsSnapshot;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

fn signal(phase: PhaseId, symbol: &str, side: Side, notional: Decimal) -> IntentSignal {
    IntentSignal {
        signal_id: format!("sig-{symbol}-{notional}"),
        phase_id: phase,
        symbol: symbol.to_string(),
        side,
        requested_notional: notional,
        hedge: false,
        timestamp_ms: now().timestamp_millis(),
        nonce: "n".to_string(),
        signature: String::new(),
    }
}

fn position(symbol: &str, side: Side, notional: Decimal) -> Position {
    Position {
        symbol: symbol.to_string(),
        side,
        notional,
        entry_price: dec!(100),
        opened_at: now() - Duration::hours(1),
    }
}

fn snapshot(positions: Vec<Position>) -> PositionsSnapshot {
    PositionsSnapshot {
        positions,
        as_of: now(),
    }
}

fn fresh_matrix(symbols: &[&str], pairs: &[(&str, &str, f64)]) -> CorrelationMatrix {
    let n = symbols.len();
    let mut rho = vec![0.0; n * n];
    for i in 0..n {
        rho[i * n + i] = 1.0;
    }
    let idx = |s: &str| symbols.iter().position(|x| *x == s).unwrap();
    for (a, b, r) in pairs {
        let (i, j) = (idx(a), idx(b));
        rho[i * n + j] = *r;
        rho[j * n + i] = *r;
    }
    CorrelationMatrix::from_dense(
        symbols.iter().map(|s| s.to_string()).collect(),
        rho,
        now(),
    )
}

fn guardian() -> RiskGuardian {
    RiskGuardian::new(GuardianConfig::default())
}

fn engine() -> CorrelationEngine {
    CorrelationEngine::new("BTC")
}

#[test]
fn clean_signal_passes_at_requested_size() {
    // Micro-tier solo P1: equity 800, no positions, BUY BTC 500.
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P1, "BTC", Side::Buy, dec!(500)),
        dec!(500),
        &snapshot(vec![]),
        &fresh_matrix(&["BTC"], &[]),
        &engine(),
        dec!(800),
        now(),
    );
    assert!(decision.approved);
    assert_eq!(decision.authorised, dec!(500));
    assert_eq!(decision.reason, DecisionReason::Ok);
}

#[test]
fn correlated_same_side_position_halves_size() {
    // Equity 20000, long BTC 4000, rho(ETH, BTC) = 0.9, BUY ETH 4000.
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P2, "ETH", Side::Buy, dec!(4000)),
        dec!(4000),
        &snapshot(vec![position("BTC", Side::Buy, dec!(4000))]),
        &fresh_matrix(&["BTC", "ETH"], &[("ETH", "BTC", 0.9)]),
        &engine(),
        dec!(20000),
        now(),
    );
    assert!(decision.approved);
    assert_eq!(decision.authorised, dec!(2000));
    assert_eq!(decision.reason, DecisionReason::HighCorrelation);
    assert!(decision.snapshot.correlation_peak > 0.8);
}

#[test]
fn opposite_side_position_is_not_correlation_checked() {
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P2, "ETH", Side::Buy, dec!(4000)),
        dec!(4000),
        &snapshot(vec![position("BTC", Side::Sell, dec!(4000))]),
        &fresh_matrix(&["BTC", "ETH"], &[("ETH", "BTC", 0.95)]),
        &engine(),
        dec!(20000),
        now(),
    );
    assert!(decision.approved);
    assert_eq!(decision.authorised, dec!(4000));
    assert_eq!(decision.reason, DecisionReason::Ok);
}

#[test]
fn leverage_breach_is_vetoed() {
    // Equity 5000 (Small, cap 10), gross 48000, request 5000 -> L' = 10.6.
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P2, "X", Side::Buy, dec!(5000)),
        dec!(5000),
        &snapshot(vec![position("BTC", Side::Buy, dec!(48000))]),
        &fresh_matrix(&["BTC", "X"], &[]),
        &engine(),
        dec!(5000),
        now(),
    );
    assert!(!decision.approved);
    assert_eq!(decision.reason, DecisionReason::LeverageCap);
    assert!((decision.snapshot.projected_leverage - 10.6).abs() < 1e-9);
}

#[test]
fn p3_hedge_bypasses_leverage_cap() {
    // Equity 30000, delta +20000; P3 SELL 15000 reduces |delta| to 5000.
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P3, "BTC", Side::Sell, dec!(15000)),
        dec!(15000),
        &snapshot(vec![
            position("BTC", Side::Buy, dec!(20000)),
            // Pad gross so the leverage cap would otherwise reject.
            position("ETH", Side::Buy, dec!(70000)),
            position("ETH", Side::Sell, dec!(70000)),
        ]),
        &fresh_matrix(&["BTC", "ETH"], &[]),
        &engine(),
        dec!(30000),
        now(),
    );
    assert!(decision.approved);
    assert_eq!(decision.authorised, dec!(15000));
    assert_eq!(decision.reason, DecisionReason::HedgeAutoApprove);
}

#[test]
fn p3_delta_increasing_signal_gets_no_fast_path() {
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P3, "BTC", Side::Buy, dec!(5000)),
        dec!(5000),
        &snapshot(vec![position("BTC", Side::Buy, dec!(20000))]),
        &fresh_matrix(&["BTC"], &[]),
        &engine(),
        dec!(30000),
        now(),
    );
    // Delta grows, so normal checks run; the same-symbol add trips the
    // correlation guard (rho = 1).
    assert!(decision.approved);
    assert_eq!(decision.authorised, dec!(2500));
    assert_eq!(decision.reason, DecisionReason::HighCorrelation);
}

#[test]
fn excessive_net_delta_is_vetoed() {
    // Leverage within cap (Micro, 20x) but |delta| > equity.
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P1, "ETH", Side::Buy, dec!(900)),
        dec!(900),
        &snapshot(vec![position("BTC", Side::Buy, dec!(600))]),
        &fresh_matrix(&["BTC", "ETH"], &[]),
        &engine(),
        dec!(1000),
        now(),
    );
    assert!(!decision.approved);
    assert_eq!(decision.reason, DecisionReason::NetDelta);
}

#[test]
fn stale_matrix_vetoes_everything() {
    let g = guardian();
    let mut matrix = fresh_matrix(&["BTC"], &[]);
    matrix.computed_at = now() - Duration::seconds(301);
    let decision = g.check(
        &signal(PhaseId::P1, "BTC", Side::Buy, dec!(100)),
        dec!(100),
        &snapshot(vec![]),
        &matrix,
        &engine(),
        dec!(10000),
        now(),
    );
    assert!(!decision.approved);
    assert_eq!(decision.reason, DecisionReason::StaleRiskData);
}

#[test]
fn stale_positions_snapshot_vetoes_everything() {
    let g = guardian();
    let stale = PositionsSnapshot {
        positions: vec![],
        as_of: now() - Duration::seconds(400),
    };
    let decision = g.check(
        &signal(PhaseId::P1, "BTC", Side::Buy, dec!(100)),
        dec!(100),
        &stale,
        &fresh_matrix(&["BTC"], &[]),
        &engine(),
        dec!(10000),
        now(),
    );
    assert!(!decision.approved);
    assert_eq!(decision.reason, DecisionReason::StaleRiskData);
}

#[test]
fn zero_equity_is_vetoed() {
    let g = guardian();
    let decision = g.check(
        &signal(PhaseId::P1, "BTC", Side::Buy, dec!(100)),
        dec!(100),
        &snapshot(vec![]),
        &fresh_matrix(&["BTC"], &[]),
        &engine(),
        dec!(0),
        now(),
    );
    assert!(!decision.approved);
    assert_eq!(decision.reason, DecisionReason::LeverageCap);
}

#[test]
fn correlation_engine_tracks_correlated_series() {
    let eng = CorrelationEngine::new("BTC");
    let t0 = now() - Duration::minutes(59);
    // Two series moving in lockstep, one anti-correlated.
    for i in 0..60 {
        let ts = t0 + Duration::minutes(i);
        let drift = ((i as f64) * 0.7).sin() * 2.0;
        eng.record_price("BTC", 100.0 + drift, ts);
        eng.record_price("ETH", 50.0 + drift * 0.5, ts);
        eng.record_price("INV", 100.0 - drift, ts);
    }
    eng.recompute(
        &["BTC".to_string(), "ETH".to_string(), "INV".to_string()],
        now(),
    );
    let matrix = eng.matrix();
    assert!(matrix.rho("BTC", "ETH").unwrap() > 0.9);
    assert!(matrix.rho("BTC", "INV").unwrap() < -0.9);
    assert_eq!(matrix.rho("BTC", "BTC"), Some(1.0));
    assert_eq!(matrix.rho("BTC", "UNKNOWN"), None);
}

#[test]
fn recompute_respects_min_interval() {
    let eng = CorrelationEngine::new("BTC");
    eng.recompute(&["BTC".to_string()], now());
    assert!(!eng.maybe_recompute(&["BTC".to_string()], now() + Duration::seconds(60)));
    assert!(eng.maybe_recompute(&["BTC".to_string()], now() + Duration::seconds(301)));
}

#[test]
fn sparse_series_is_excluded_from_matrix() {
    let eng = CorrelationEngine::new("BTC");
    let t0 = now() - Duration::minutes(59);
    for i in 0..60 {
        eng.record_price("BTC", 100.0 + i as f64, t0 + Duration::minutes(i));
    }
    // Only three observations for ETH: below the usable minimum.
    for i in 0..3 {
        eng.record_price("ETH", 50.0 + i as f64, t0 + Duration::minutes(i * 20));
    }
    eng.recompute(&["BTC".to_string(), "ETH".to_string()], now());
    assert_eq!(eng.matrix().rho("BTC", "ETH"), Some(0.0));
}

proptest! {
    /// Approved non-hedge decisions never leave projected leverage above the
    /// tier cap.
    #[test]
    fn approved_leverage_stays_under_cap(
        equity in 100.0f64..100_000.0,
        gross in 0.0f64..500_000.0,
        requested in 1.0f64..50_000.0,
    ) {
        let g = guardian();
        let equity = Decimal::from_f64_retain(equity).unwrap().round_dp(2);
        let gross = Decimal::from_f64_retain(gross).unwrap().round_dp(2);
        let requested = Decimal::from_f64_retain(requested).unwrap().round_dp(2);

        // Flat book (balanced long/short) so only leverage can reject.
        let half = gross / Decimal::TWO;
        let positions = vec![
            position("BTC", Side::Buy, half),
            position("ETH", Side::Sell, half),
        ];
        let decision = g.check(
            &signal(PhaseId::P1, "SOL", Side::Buy, requested),
            requested,
            &snapshot(positions),
            &fresh_matrix(&["BTC", "ETH", "SOL"], &[]),
            &engine(),
            equity,
            now(),
        );
        if decision.approved {
            let cap = brain_core::EquityTier::from_equity(equity).max_leverage();
            let projected = (gross + decision.authorised) / equity;
            prop_assert!(projected <= cap + Decimal::new(1, 6));
        }
    }

    /// The Guardian never grants more than requested; a correlation-haircut
    /// approval grants at most half.
    #[test]
    fn authorised_never_exceeds_requested(
        requested in 1.0f64..10_000.0,
        rho in -1.0f64..1.0,
    ) {
        let g = guardian();
        let requested = Decimal::from_f64_retain(requested).unwrap().round_dp(2);
        let decision = g.check(
            &signal(PhaseId::P2, "ETH", Side::Buy, requested),
            requested,
            &snapshot(vec![position("BTC", Side::Buy, dec!(1000))]),
            &fresh_matrix(&["BTC", "ETH"], &[("ETH", "BTC", rho)]),
            &engine(),
            dec!(1_000_000),
            now(),
        );
        prop_assert!(decision.authorised <= requested);
        if decision.reason == DecisionReason::HighCorrelation {
            prop_assert!(decision.authorised <= requested / Decimal::TWO);
        }
    }
}
