use brain_core::DecisionReason;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal_macros::dec;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::models::{BreakerEventKind, BreakerState, HardReason};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
}

#[test]
fn daily_drawdown_trips_hard() {
    // Start-of-day 10000, intraday 8400: -16% breaches the -15% limit.
    let breaker = CircuitBreaker::default();
    let event = breaker.evaluate(dec!(8400), dec!(10000), now()).unwrap();
    assert_eq!(event.kind, BreakerEventKind::Trigger);
    assert_eq!(event.reason, "DAILY_DD");
    assert_eq!(
        breaker.gate(now()),
        Err(DecisionReason::BreakerDailyDd)
    );
    assert!(breaker.flatten_pending());
}

#[test]
fn drawdown_within_limit_does_not_trip() {
    let breaker = CircuitBreaker::default();
    assert!(breaker.evaluate(dec!(8600), dec!(10000), now()).is_none());
    assert!(breaker.gate(now()).is_ok());
}

#[test]
fn equity_floor_trips_hard() {
    let breaker = CircuitBreaker::default();
    let event = breaker.evaluate(dec!(149), dec!(150), now()).unwrap();
    assert_eq!(event.reason, "MIN_EQUITY");
    assert_eq!(breaker.gate(now()), Err(DecisionReason::BreakerMinEquity));
}

#[test]
fn three_consecutive_losses_engage_cooldown() {
    let breaker = CircuitBreaker::default();
    let t0 = now();
    assert!(breaker.record_fill(dec!(-10), dec!(5000), t0).is_none());
    assert!(breaker
        .record_fill(dec!(-5), dec!(4995), t0 + Duration::minutes(10))
        .is_none());
    let event = breaker
        .record_fill(dec!(-7), dec!(4988), t0 + Duration::minutes(20))
        .unwrap();
    assert_eq!(event.reason, "COOLDOWN");
    assert_eq!(
        breaker.gate(t0 + Duration::minutes(21)),
        Err(DecisionReason::Cooldown)
    );
}

#[test]
fn winning_fill_breaks_the_streak() {
    let breaker = CircuitBreaker::default();
    let t0 = now();
    breaker.record_fill(dec!(-10), dec!(5000), t0);
    breaker.record_fill(dec!(-5), dec!(4995), t0 + Duration::minutes(5));
    breaker.record_fill(dec!(20), dec!(5015), t0 + Duration::minutes(10));
    assert!(breaker
        .record_fill(dec!(-3), dec!(5012), t0 + Duration::minutes(15))
        .is_none());
    assert!(breaker.gate(t0 + Duration::minutes(16)).is_ok());
}

#[test]
fn losses_outside_window_do_not_count() {
    let breaker = CircuitBreaker::default();
    let t0 = now();
    breaker.record_fill(dec!(-10), dec!(5000), t0);
    breaker.record_fill(dec!(-5), dec!(4995), t0 + Duration::minutes(30));
    // Third loss lands 70 minutes after the first; the first has aged out.
    assert!(breaker
        .record_fill(dec!(-7), dec!(4988), t0 + Duration::minutes(70))
        .is_none());
}

#[test]
fn cooldown_expires_automatically() {
    let breaker = CircuitBreaker::default();
    let t0 = now();
    breaker.trigger_soft(dec!(5000), t0).unwrap();
    assert_eq!(
        breaker.gate(t0 + Duration::minutes(29)),
        Err(DecisionReason::Cooldown)
    );
    assert!(breaker.gate(t0 + Duration::minutes(30)).is_ok());
    assert!(breaker.state(t0 + Duration::minutes(31)).is_normal());
}

#[test]
fn hard_trigger_while_hard_is_a_noop() {
    let breaker = CircuitBreaker::default();
    let first = breaker.trigger_hard(HardReason::DailyDrawdown, dec!(8000), now());
    assert!(first.is_some());
    // Re-triggering with any reason changes nothing and emits nothing.
    assert!(breaker
        .trigger_hard(HardReason::MinEquity, dec!(100), now() + Duration::minutes(1))
        .is_none());
    match breaker.state(now() + Duration::minutes(2)) {
        BreakerState::Hard { reason, since } => {
            assert_eq!(reason, HardReason::DailyDrawdown);
            assert_eq!(since, now());
        }
        other => panic!("expected hard state, got {other:?}"),
    }
}

#[test]
fn soft_trigger_does_not_downgrade_hard() {
    let breaker = CircuitBreaker::default();
    breaker.trigger_hard(HardReason::MinEquity, dec!(100), now());
    assert!(breaker.trigger_soft(dec!(100), now()).is_none());
    assert_eq!(breaker.gate(now()), Err(DecisionReason::BreakerMinEquity));
}

#[test]
fn hard_overrides_soft() {
    let breaker = CircuitBreaker::default();
    breaker.trigger_soft(dec!(5000), now());
    assert!(breaker
        .trigger_hard(HardReason::DailyDrawdown, dec!(4000), now())
        .is_some());
    assert_eq!(breaker.gate(now()), Err(DecisionReason::BreakerDailyDd));
}

#[test]
fn reset_in_normal_is_a_noop() {
    let breaker = CircuitBreaker::default();
    let event = breaker.reset("ops-1", "manual check", dec!(5000), now()).unwrap();
    assert!(event.is_none());
}

#[test]
fn reset_is_latched_on_flatten_completion() {
    let breaker = CircuitBreaker::default();
    breaker.trigger_hard(HardReason::DailyDrawdown, dec!(8000), now());

    // Flatten has not confirmed: reset refused, state stays hard.
    assert!(breaker.reset("ops-1", "recovered", dec!(9000), now()).is_err());
    assert_eq!(breaker.gate(now()), Err(DecisionReason::BreakerDailyDd));

    breaker.confirm_flatten();
    let event = breaker
        .reset("ops-1", "recovered", dec!(9000), now())
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, BreakerEventKind::Reset);
    assert_eq!(event.operator_id.as_deref(), Some("ops-1"));
    assert!(breaker.gate(now()).is_ok());
}

#[test]
fn restore_resumes_persisted_state() {
    let state = BreakerState::Hard {
        reason: HardReason::DailyDrawdown,
        since: now() - Duration::hours(2),
    };
    let breaker = CircuitBreaker::restore(BreakerConfig::default(), state, true);
    assert_eq!(breaker.gate(now()), Err(DecisionReason::BreakerDailyDd));
    assert!(breaker.flatten_pending());
}

proptest! {
    /// Repeated triggers while hard never change state or emit events.
    #[test]
    fn triggers_while_hard_are_noops(extra_triggers in 1usize..20) {
        let breaker = CircuitBreaker::default();
        breaker.trigger_hard(HardReason::DailyDrawdown, dec!(8000), now());
        for i in 0..extra_triggers {
            let ts = now() + Duration::minutes(i as i64);
            prop_assert!(breaker.trigger_hard(HardReason::MinEquity, dec!(1), ts).is_none());
            prop_assert!(breaker.trigger_soft(dec!(1), ts).is_none());
            prop_assert!(breaker.evaluate(dec!(1), dec!(10000), ts).is_none());
        }
        match breaker.state(now()) {
            BreakerState::Hard { reason, since } => {
                prop_assert_eq!(reason, HardReason::DailyDrawdown);
                prop_assert_eq!(since, now());
            }
            other => prop_assert!(false, "expected hard, got {:?}", other),
        }
    }
}
