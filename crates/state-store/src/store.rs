//! Durable persistence for allocations, trades, decisions, treasury and
//! breaker events.
//!
//! Decisions are written on the hot path and must land before any external
//! side-effect; everything else is telemetry that may be buffered in memory
//! when the store degrades. Money columns are stored as TEXT so Decimal
//! precision survives the round trip.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use brain_core::{BrainDecision, PhaseId, RiskSnapshot};
use capital_flow::{TreasuryOp, TreasuryState};
use chrono::{DateTime, Utc};
use circuit_breaker::{BreakerEvent, BreakerState};
use performance_tracker::{PhaseAggregates, TradeRecord};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

const STATE_KEY_TREASURY: &str = "treasury";
const STATE_KEY_BREAKER: &str = "breaker";
const STATE_KEY_DAY_START: &str = "start_of_day_equity";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backoff between write retries on the telemetry path.
    pub retry_backoff: Vec<Duration>,
    /// Telemetry events held in memory while the store is down.
    pub buffer_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retry_backoff: vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(1),
            ],
            buffer_capacity: 1000,
        }
    }
}

/// A telemetry write parked while the store is unavailable.
#[derive(Debug, Clone)]
enum BufferedWrite {
    Allocation {
        ts: DateTime<Utc>,
        equity: Decimal,
        w1: f64,
        w2: f64,
        w3: f64,
        tier: String,
    },
    PhaseTrade {
        phase_id: PhaseId,
        ts: DateTime<Utc>,
        pnl: Decimal,
    },
    PhasePerformance {
        phase_id: PhaseId,
        ts: DateTime<Utc>,
        sharpe: f64,
        modifier: f64,
    },
    TreasuryOp(TreasuryOp),
    BreakerEvent(BreakerEvent),
    RiskSnapshot {
        ts: DateTime<Utc>,
        snapshot: RiskSnapshot,
        var_95: f64,
    },
}

pub struct BrainStore {
    pool: SqlitePool,
    config: StoreConfig,
    buffer: Mutex<VecDeque<BufferedWrite>>,
    degraded: AtomicBool,
}

impl BrainStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, StoreConfig::default())
    }

    pub fn with_config(pool: SqlitePool, config: StoreConfig) -> Self {
        Self {
            pool,
            config,
            buffer: Mutex::new(VecDeque::new()),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether writes are currently being buffered. While degraded the
    /// Arbiter must not emit new approvals.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS allocation_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                equity TEXT NOT NULL,
                w1 REAL NOT NULL,
                w2 REAL NOT NULL,
                w3 REAL NOT NULL,
                tier TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS phase_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phase_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                pnl TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS phase_performance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phase_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                sharpe REAL NOT NULL,
                modifier REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS decisions (
                signal_id TEXT PRIMARY KEY,
                decision_id TEXT NOT NULL,
                phase_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                approved INTEGER NOT NULL,
                requested TEXT NOT NULL,
                authorised TEXT NOT NULL,
                reason TEXT NOT NULL,
                snapshot_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS treasury_ops (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount TEXT NOT NULL,
                from_bucket TEXT NOT NULL,
                to_bucket TEXT NOT NULL,
                post_hwm TEXT NOT NULL,
                reason TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS breaker_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                kind TEXT NOT NULL,
                reason TEXT NOT NULL,
                equity TEXT NOT NULL,
                operator_id TEXT,
                context_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS risk_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                leverage REAL NOT NULL,
                net_delta TEXT NOT NULL,
                correlation_score REAL NOT NULL,
                portfolio_beta REAL NOT NULL,
                var_95 REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS brain_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // -- decisions (hot path, never buffered) ------------------------------

    /// Persist a decision. Idempotent by signal_id: re-inserting an already
    /// decided signal changes nothing and returns false.
    pub async fn insert_decision(&self, decision: &BrainDecision) -> Result<bool> {
        let snapshot_json =
            serde_json::to_string(decision).context("serializing decision snapshot")?;
        let result = sqlx::query(
            "INSERT INTO decisions
             (signal_id, decision_id, phase_id, ts, approved, requested, authorised, reason, snapshot_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(signal_id) DO NOTHING",
        )
        .bind(&decision.signal_id)
        .bind(&decision.decision_id)
        .bind(decision.phase_id.as_str())
        .bind(decision.ts.to_rfc3339())
        .bind(decision.approved)
        .bind(decision.requested_notional.to_string())
        .bind(decision.authorised_notional.to_string())
        .bind(decision.reason.as_str())
        .bind(&snapshot_json)
        .execute(&self.pool)
        .await
        .context("inserting decision")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn fetch_decision(&self, signal_id: &str) -> Result<Option<BrainDecision>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT snapshot_json FROM decisions WHERE signal_id = ?")
                .bind(signal_id)
                .fetch_optional(&self.pool)
                .await
                .context("fetching decision")?;
        match row {
            Some((json,)) => Ok(Some(
                serde_json::from_str(&json).context("decoding decision snapshot")?,
            )),
            None => Ok(None),
        }
    }

    /// Update a persisted decision's reason (approved-but-not-sent bookkeeping).
    pub async fn mark_decision_reason(&self, signal_id: &str, reason: &str) -> Result<()> {
        sqlx::query("UPDATE decisions SET reason = ? WHERE signal_id = ?")
            .bind(reason)
            .bind(signal_id)
            .execute(&self.pool)
            .await
            .context("updating decision reason")?;
        Ok(())
    }

    pub async fn decision_counts_by_phase(&self) -> Result<Vec<(String, i64, i64)>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT phase_id,
                    COUNT(*) AS total,
                    SUM(CASE WHEN approved = 1 THEN 1 ELSE 0 END) AS approved
             FROM decisions GROUP BY phase_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- telemetry (buffered while degraded) -------------------------------

    pub async fn record_allocation(
        &self,
        ts: DateTime<Utc>,
        equity: Decimal,
        w1: f64,
        w2: f64,
        w3: f64,
        tier: &str,
    ) -> Result<()> {
        self.write_or_buffer(BufferedWrite::Allocation {
            ts,
            equity,
            w1,
            w2,
            w3,
            tier: tier.to_string(),
        })
        .await
    }

    pub async fn record_phase_trade(
        &self,
        phase_id: PhaseId,
        ts: DateTime<Utc>,
        pnl: Decimal,
    ) -> Result<()> {
        self.write_or_buffer(BufferedWrite::PhaseTrade { phase_id, ts, pnl })
            .await
    }

    pub async fn record_phase_performance(
        &self,
        aggregates: &[PhaseAggregates],
        ts: DateTime<Utc>,
    ) -> Result<()> {
        for agg in aggregates {
            self.write_or_buffer(BufferedWrite::PhasePerformance {
                phase_id: agg.phase_id,
                ts,
                sharpe: agg.sharpe,
                modifier: agg.modifier,
            })
            .await?;
        }
        Ok(())
    }

    pub async fn record_treasury_op(&self, op: &TreasuryOp) -> Result<()> {
        self.write_or_buffer(BufferedWrite::TreasuryOp(op.clone()))
            .await
    }

    pub async fn record_breaker_event(&self, event: &BreakerEvent) -> Result<()> {
        self.write_or_buffer(BufferedWrite::BreakerEvent(event.clone()))
            .await
    }

    pub async fn record_risk_snapshot(
        &self,
        ts: DateTime<Utc>,
        snapshot: &RiskSnapshot,
        var_95: f64,
    ) -> Result<()> {
        self.write_or_buffer(BufferedWrite::RiskSnapshot {
            ts,
            snapshot: *snapshot,
            var_95,
        })
        .await
    }

    // -- key-value state ---------------------------------------------------

    pub async fn save_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO brain_state (key, value, updated_at) VALUES (?, ?, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_state(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM brain_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn save_treasury(&self, state: &TreasuryState) -> Result<()> {
        self.save_state(STATE_KEY_TREASURY, &serde_json::to_string(state)?)
            .await
    }

    pub async fn load_treasury(&self) -> Result<Option<TreasuryState>> {
        Ok(match self.load_state(STATE_KEY_TREASURY).await? {
            Some(json) => serde_json::from_str(&json).ok(),
            None => None,
        })
    }

    pub async fn save_breaker_state(
        &self,
        state: &BreakerState,
        flatten_pending: bool,
    ) -> Result<()> {
        let value = serde_json::to_string(&(state, flatten_pending))?;
        self.save_state(STATE_KEY_BREAKER, &value).await
    }

    pub async fn load_breaker_state(&self) -> Result<Option<(BreakerState, bool)>> {
        Ok(match self.load_state(STATE_KEY_BREAKER).await? {
            Some(json) => serde_json::from_str(&json).ok(),
            None => None,
        })
    }

    pub async fn save_start_of_day_equity(
        &self,
        equity: Decimal,
        day: DateTime<Utc>,
    ) -> Result<()> {
        let value = serde_json::to_string(&(equity.to_string(), day.to_rfc3339()))?;
        self.save_state(STATE_KEY_DAY_START, &value).await
    }

    pub async fn load_start_of_day_equity(&self) -> Result<Option<(Decimal, DateTime<Utc>)>> {
        let Some(json) = self.load_state(STATE_KEY_DAY_START).await? else {
            return Ok(None);
        };
        let (equity, day): (String, String) = serde_json::from_str(&json)?;
        let equity = Decimal::from_str(&equity)?;
        let day = DateTime::parse_from_rfc3339(&day)?.with_timezone(&Utc);
        Ok(Some((equity, day)))
    }

    // -- recovery reads ----------------------------------------------------

    /// Trade log for one phase since the cutoff, oldest first.
    pub async fn load_phase_trades(
        &self,
        phase_id: PhaseId,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT ts, pnl FROM phase_trades WHERE phase_id = ? AND ts >= ? ORDER BY ts ASC",
        )
        .bind(phase_id.as_str())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (ts, pnl) in rows {
            let ts = DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc);
            let pnl = Decimal::from_str(&pnl)?;
            records.push(TradeRecord { ts, pnl });
        }
        Ok(records)
    }

    pub async fn latest_allocation(&self) -> Result<Option<(DateTime<Utc>, f64, f64, f64)>> {
        let row: Option<(String, f64, f64, f64)> = sqlx::query_as(
            "SELECT ts, w1, w2, w3 FROM allocation_history ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some((ts, w1, w2, w3)) => Some((
                DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc),
                w1,
                w2,
                w3,
            )),
            None => None,
        })
    }

    // -- buffered write machinery ------------------------------------------

    /// Drain buffered telemetry after the store recovers. Returns how many
    /// events were flushed.
    pub async fn flush_buffer(&self) -> Result<usize> {
        let mut flushed = 0;
        loop {
            let next = {
                let mut buffer = self.buffer.lock().await;
                buffer.pop_front()
            };
            let Some(event) = next else { break };
            if let Err(err) = self.write_event(&event).await {
                // Still down: put it back and stop.
                let mut buffer = self.buffer.lock().await;
                buffer.push_front(event);
                return Err(err);
            }
            flushed += 1;
        }
        if flushed > 0 {
            tracing::info!(flushed, "store recovered, buffered telemetry flushed");
        }
        self.degraded.store(false, Ordering::SeqCst);
        Ok(flushed)
    }

    pub async fn buffered_events(&self) -> usize {
        self.buffer.lock().await.len()
    }

    async fn write_or_buffer(&self, event: BufferedWrite) -> Result<()> {
        let mut last_err = None;
        let attempts = self.config.retry_backoff.len();
        for attempt in 0..=attempts {
            match self.write_event(&event).await {
                Ok(()) => {
                    if self.is_degraded() {
                        // A direct write succeeded: try to drain the backlog.
                        let _ = self.flush_buffer().await;
                    }
                    return Ok(());
                }
                Err(err) => last_err = Some(err),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff[attempt]).await;
            }
        }

        let err = last_err.expect("write failed without error");
        let mut buffer = self.buffer.lock().await;
        if buffer.len() >= self.config.buffer_capacity {
            tracing::error!("telemetry buffer full, dropping oldest event");
            buffer.pop_front();
        }
        buffer.push_back(event);
        self.degraded.store(true, Ordering::SeqCst);
        tracing::warn!(
            buffered = buffer.len(),
            error = %err,
            "store unavailable, telemetry buffered"
        );
        Ok(())
    }

    async fn write_event(&self, event: &BufferedWrite) -> Result<()> {
        match event {
            BufferedWrite::Allocation {
                ts,
                equity,
                w1,
                w2,
                w3,
                tier,
            } => {
                sqlx::query(
                    "INSERT INTO allocation_history (ts, equity, w1, w2, w3, tier)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(ts.to_rfc3339())
                .bind(equity.to_string())
                .bind(w1)
                .bind(w2)
                .bind(w3)
                .bind(tier)
                .execute(&self.pool)
                .await?;
            }
            BufferedWrite::PhaseTrade { phase_id, ts, pnl } => {
                sqlx::query("INSERT INTO phase_trades (phase_id, ts, pnl) VALUES (?, ?, ?)")
                    .bind(phase_id.as_str())
                    .bind(ts.to_rfc3339())
                    .bind(pnl.to_string())
                    .execute(&self.pool)
                    .await?;
            }
            BufferedWrite::PhasePerformance {
                phase_id,
                ts,
                sharpe,
                modifier,
            } => {
                sqlx::query(
                    "INSERT INTO phase_performance (phase_id, ts, sharpe, modifier)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(phase_id.as_str())
                .bind(ts.to_rfc3339())
                .bind(sharpe)
                .bind(modifier)
                .execute(&self.pool)
                .await?;
            }
            BufferedWrite::TreasuryOp(op) => {
                sqlx::query(
                    "INSERT INTO treasury_ops (ts, kind, amount, from_bucket, to_bucket, post_hwm, reason)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(op.ts.to_rfc3339())
                .bind(op.kind.as_str())
                .bind(op.amount.to_string())
                .bind(&op.from)
                .bind(&op.to)
                .bind(op.post_hwm.to_string())
                .bind(&op.reason)
                .execute(&self.pool)
                .await?;
            }
            BufferedWrite::BreakerEvent(event) => {
                sqlx::query(
                    "INSERT INTO breaker_events (ts, kind, reason, equity, operator_id, context_json)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(event.ts.to_rfc3339())
                .bind(event.kind.as_str())
                .bind(&event.reason)
                .bind(event.equity.to_string())
                .bind(event.operator_id.as_deref())
                .bind(event.context.to_string())
                .execute(&self.pool)
                .await?;
            }
            BufferedWrite::RiskSnapshot {
                ts,
                snapshot,
                var_95,
            } => {
                sqlx::query(
                    "INSERT INTO risk_snapshots (ts, leverage, net_delta, correlation_score, portfolio_beta, var_95)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(ts.to_rfc3339())
                .bind(snapshot.projected_leverage)
                .bind(snapshot.net_delta.to_string())
                .bind(snapshot.correlation_peak)
                .bind(snapshot.portfolio_beta)
                .bind(*var_95)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}
