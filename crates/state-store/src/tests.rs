use brain_core::{
    AllocationSnapshot, BrainDecision, DecisionReason, EquityTier, PhaseId, RiskSnapshot,
};
use capital_flow::{TreasuryOp, TreasuryOpKind, TreasuryState};
use chrono::{Duration, TimeZone, Utc};
use circuit_breaker::{BreakerEvent, BreakerEventKind, BreakerState, HardReason};
use rust_decimal_macros::dec;
use sqlx::sqlite::SqlitePoolOptions;

use crate::store::{BrainStore, StoreConfig};

async fn memory_store() -> BrainStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite");
    let store = BrainStore::with_config(
        pool,
        StoreConfig {
            retry_backoff: Vec::new(),
            buffer_capacity: 10,
        },
    );
    store.init_tables().await.unwrap();
    store
}

fn sample_decision(signal_id: &str, approved: bool) -> BrainDecision {
    BrainDecision {
        decision_id: format!("d-{signal_id}"),
        signal_id: signal_id.to_string(),
        phase_id: PhaseId::P2,
        approved,
        requested_notional: dec!(4000),
        authorised_notional: if approved { dec!(2000) } else { dec!(0) },
        reason: if approved {
            DecisionReason::HighCorrelation
        } else {
            DecisionReason::LeverageCap
        },
        allocation: Some(AllocationSnapshot {
            w1: 0.2,
            w2: 0.8,
            w3: 0.0,
            tier: EquityTier::Medium,
            max_leverage: 5.0,
            override_active: false,
        }),
        risk: Some(RiskSnapshot {
            projected_leverage: 1.2,
            net_delta: dec!(6000),
            correlation_peak: 0.9,
            portfolio_beta: 0.4,
            matrix_age_secs: 30,
        }),
        performance: None,
        ts: Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn decision_insert_is_idempotent_by_signal_id() {
    let store = memory_store().await;
    let decision = sample_decision("sig-1", true);

    assert!(store.insert_decision(&decision).await.unwrap());

    // A conflicting second write changes nothing.
    let mut replay = sample_decision("sig-1", false);
    replay.decision_id = "d-other".to_string();
    assert!(!store.insert_decision(&replay).await.unwrap());

    let fetched = store.fetch_decision("sig-1").await.unwrap().unwrap();
    assert_eq!(fetched.decision_id, "d-sig-1");
    assert!(fetched.approved);
    assert_eq!(fetched.authorised_notional, dec!(2000));
    assert_eq!(fetched.reason, DecisionReason::HighCorrelation);
}

#[tokio::test]
async fn missing_decision_reads_as_none() {
    let store = memory_store().await;
    assert!(store.fetch_decision("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn decision_reason_can_be_remarked() {
    let store = memory_store().await;
    store
        .insert_decision(&sample_decision("sig-2", true))
        .await
        .unwrap();
    store
        .mark_decision_reason("sig-2", DecisionReason::SendFailed.as_str())
        .await
        .unwrap();
    let counts = store.decision_counts_by_phase().await.unwrap();
    assert_eq!(counts, vec![("P2".to_string(), 1, 1)]);
}

#[tokio::test]
async fn phase_trades_round_trip() {
    let store = memory_store().await;
    let t0 = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
    for i in 0..5 {
        store
            .record_phase_trade(PhaseId::P1, t0 + Duration::minutes(i), dec!(12.5))
            .await
            .unwrap();
    }
    store
        .record_phase_trade(PhaseId::P2, t0, dec!(-3))
        .await
        .unwrap();

    let trades = store
        .load_phase_trades(PhaseId::P1, t0 - Duration::days(1))
        .await
        .unwrap();
    assert_eq!(trades.len(), 5);
    assert_eq!(trades[0].pnl, dec!(12.5));
    assert!(trades.windows(2).all(|w| w[0].ts <= w[1].ts));

    // The cutoff filters.
    let later = store
        .load_phase_trades(PhaseId::P1, t0 + Duration::minutes(3))
        .await
        .unwrap();
    assert_eq!(later.len(), 2);
}

#[tokio::test]
async fn treasury_state_round_trips() {
    let store = memory_store().await;
    let state = TreasuryState {
        risky_balance: dec!(12000),
        safe_balance: dec!(3000),
        total_swept: dec!(3000),
        high_watermark: dec!(15500.55),
        reserve_floor: dec!(200),
    };
    store.save_treasury(&state).await.unwrap();
    let loaded = store.load_treasury().await.unwrap().unwrap();
    assert_eq!(loaded.risky_balance, dec!(12000));
    assert_eq!(loaded.high_watermark, dec!(15500.55));
    assert_eq!(loaded.total_swept, dec!(3000));
}

#[tokio::test]
async fn breaker_state_round_trips() {
    let store = memory_store().await;
    let since = Utc.with_ymd_and_hms(2026, 3, 15, 9, 30, 0).unwrap();
    let state = BreakerState::Hard {
        reason: HardReason::DailyDrawdown,
        since,
    };
    store.save_breaker_state(&state, true).await.unwrap();
    let (loaded, flatten_pending) = store.load_breaker_state().await.unwrap().unwrap();
    assert_eq!(loaded, state);
    assert!(flatten_pending);
}

#[tokio::test]
async fn start_of_day_equity_round_trips() {
    let store = memory_store().await;
    let day = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
    store
        .save_start_of_day_equity(dec!(10000), day)
        .await
        .unwrap();
    let (equity, loaded_day) = store.load_start_of_day_equity().await.unwrap().unwrap();
    assert_eq!(equity, dec!(10000));
    assert_eq!(loaded_day, day);
}

#[tokio::test]
async fn breaker_and_treasury_events_are_recorded() {
    let store = memory_store().await;
    let ts = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();

    store
        .record_breaker_event(&BreakerEvent {
            ts,
            kind: BreakerEventKind::Trigger,
            reason: "DAILY_DD".to_string(),
            equity: dec!(8400),
            operator_id: None,
            context: serde_json::json!({ "hard": true }),
        })
        .await
        .unwrap();

    store
        .record_treasury_op(&TreasuryOp {
            ts,
            kind: TreasuryOpKind::Sweep,
            amount: dec!(3000),
            from: "risky".to_string(),
            to: "safe".to_string(),
            post_hwm: dec!(15000),
            reason: "ratchet".to_string(),
        })
        .await
        .unwrap();

    let (breaker_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM breaker_events")
        .fetch_one(store.pool())
        .await
        .unwrap();
    let (treasury_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM treasury_ops")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(breaker_rows, 1);
    assert_eq!(treasury_rows, 1);
    assert!(!store.is_degraded());
}

#[tokio::test]
async fn telemetry_buffers_when_store_is_down() {
    let store = memory_store().await;
    store.pool().close().await;

    let ts = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
    // Telemetry writes degrade instead of failing.
    store
        .record_phase_trade(PhaseId::P1, ts, dec!(5))
        .await
        .unwrap();
    assert!(store.is_degraded());
    assert_eq!(store.buffered_events().await, 1);

    // The hot path refuses instead of buffering.
    assert!(store
        .insert_decision(&sample_decision("sig-9", true))
        .await
        .is_err());
}

#[tokio::test]
async fn buffer_drops_oldest_beyond_capacity() {
    let store = memory_store().await;
    store.pool().close().await;
    let ts = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
    for i in 0..15 {
        store
            .record_phase_trade(PhaseId::P1, ts + Duration::seconds(i), dec!(1))
            .await
            .unwrap();
    }
    // Capacity is 10 in the test config.
    assert_eq!(store.buffered_events().await, 10);
}
