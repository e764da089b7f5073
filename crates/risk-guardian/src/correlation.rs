//! Rolling correlation of 1-minute log-returns.
//!
//! A single owner task records prices and recomputes the pairwise matrix at
//! most every 5 minutes; consumers always read the last valid matrix through
//! an atomically swapped `Arc`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock, RwLock};

use brain_core::Position;
use chrono::{DateTime, Duration, TimeZone, Utc};
use nalgebra::DMatrix;
use rust_decimal::prelude::ToPrimitive;
use statrs::distribution::{ContinuousCDF, Normal};

/// Window over which returns are correlated.
const WINDOW_MINUTES: i64 = 60;

/// Closes retained per symbol (twice the window for forward-filling).
const MAX_CLOSES: usize = 2 * WINDOW_MINUTES as usize + 1;

/// Minimum raw observations inside the window before a series is usable.
const MIN_POINTS: usize = 10;

/// One-sided 95% quantile of the standard normal, for parametric VaR.
fn z_95() -> f64 {
    static Z: OnceLock<f64> = OnceLock::new();
    *Z.get_or_init(|| {
        Normal::new(0.0, 1.0)
            .expect("standard normal")
            .inverse_cdf(0.95)
    })
}

#[derive(Default)]
struct SymbolSeries {
    /// (minute bucket, close) pairs, oldest first.
    closes: VecDeque<(i64, f64)>,
}

impl SymbolSeries {
    fn record(&mut self, minute: i64, price: f64) {
        if let Some(last) = self.closes.back_mut() {
            if last.0 == minute {
                last.1 = price;
                return;
            }
        }
        self.closes.push_back((minute, price));
        while self.closes.len() > MAX_CLOSES {
            self.closes.pop_front();
        }
    }

    /// Forward-filled minute closes covering the window ending at `now`.
    fn window_closes(&self, now: DateTime<Utc>) -> Option<Vec<f64>> {
        let end_minute = now.timestamp() / 60;
        let start_minute = end_minute - WINDOW_MINUTES;
        let in_window = self
            .closes
            .iter()
            .filter(|(m, _)| *m >= start_minute && *m <= end_minute)
            .count();
        if in_window < MIN_POINTS {
            return None;
        }

        let mut filled = Vec::with_capacity(WINDOW_MINUTES as usize + 1);
        let mut iter = self.closes.iter().peekable();
        let mut last: Option<f64> = None;
        for minute in start_minute..=end_minute {
            while let Some((m, close)) = iter.peek() {
                if *m <= minute {
                    last = Some(*close);
                    iter.next();
                } else {
                    break;
                }
            }
            if let Some(close) = last {
                filled.push(close);
            }
        }
        Some(filled)
    }
}

/// Per-symbol 1-minute close history feeding the matrix.
#[derive(Default)]
pub struct PriceHistory {
    series: RwLock<HashMap<String, SymbolSeries>>,
}

impl PriceHistory {
    pub fn record_price(&self, symbol: &str, price: f64, ts: DateTime<Utc>) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        let mut series = self.series.write().expect("price history lock poisoned");
        series
            .entry(symbol.to_string())
            .or_default()
            .record(ts.timestamp() / 60, price);
    }

    fn returns_for(&self, symbol: &str, now: DateTime<Utc>) -> Option<Vec<f64>> {
        let series = self.series.read().expect("price history lock poisoned");
        let closes = series.get(symbol)?.window_closes(now)?;
        Some(log_returns(&closes))
    }
}

/// Dense symmetric pairwise correlation matrix over the tracked symbols.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
    rho: DMatrix<f64>,
    pub computed_at: DateTime<Utc>,
}

impl CorrelationMatrix {
    /// A matrix that has never been computed; always reads as stale.
    pub fn empty() -> Self {
        Self {
            symbols: Vec::new(),
            index: HashMap::new(),
            rho: DMatrix::zeros(0, 0),
            computed_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    /// Build a matrix from an explicit dense row-major table.
    /// `rho.len()` must equal `symbols.len()^2`.
    pub fn from_dense(symbols: Vec<String>, rho: Vec<f64>, computed_at: DateTime<Utc>) -> Self {
        debug_assert_eq!(rho.len(), symbols.len() * symbols.len());
        let n = symbols.len();
        let index = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        Self {
            symbols,
            index,
            rho: DMatrix::from_row_slice(n, n, &rho),
            computed_at,
        }
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.computed_at).num_seconds()
    }

    /// Pairwise correlation, `None` when either symbol is untracked.
    pub fn rho(&self, a: &str, b: &str) -> Option<f64> {
        if a == b {
            return Some(1.0);
        }
        let i = *self.index.get(a)?;
        let j = *self.index.get(b)?;
        Some(self.rho[(i, j)])
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

pub struct CorrelationEngine {
    history: PriceHistory,
    matrix: RwLock<Arc<CorrelationMatrix>>,
    /// Symbol whose returns anchor portfolio beta.
    benchmark: String,
    min_recompute_interval: Duration,
}

impl CorrelationEngine {
    pub fn new(benchmark: impl Into<String>) -> Self {
        Self {
            history: PriceHistory::default(),
            matrix: RwLock::new(Arc::new(CorrelationMatrix::empty())),
            benchmark: benchmark.into(),
            min_recompute_interval: Duration::seconds(300),
        }
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn record_price(&self, symbol: &str, price: f64, ts: DateTime<Utc>) {
        self.history.record_price(symbol, price, ts);
    }

    /// The last valid matrix. Consumers judge staleness themselves.
    pub fn matrix(&self) -> Arc<CorrelationMatrix> {
        self.matrix.read().expect("matrix lock poisoned").clone()
    }

    /// Swap in an externally built matrix (tests, warm-start).
    pub fn install(&self, matrix: CorrelationMatrix) {
        *self.matrix.write().expect("matrix lock poisoned") = Arc::new(matrix);
    }

    /// Recompute if the current matrix is older than the minimum interval.
    /// Returns whether a recompute ran.
    pub fn maybe_recompute(&self, symbols: &[String], now: DateTime<Utc>) -> bool {
        if self.matrix().age_secs(now) < self.min_recompute_interval.num_seconds() {
            return false;
        }
        self.recompute(symbols, now);
        true
    }

    /// Unconditional recompute over the given symbol universe.
    pub fn recompute(&self, symbols: &[String], now: DateTime<Utc>) {
        let mut tracked: Vec<String> = Vec::with_capacity(symbols.len() + 1);
        for s in symbols {
            if !tracked.contains(s) {
                tracked.push(s.clone());
            }
        }
        if !tracked.contains(&self.benchmark) {
            tracked.push(self.benchmark.clone());
        }

        let returns: Vec<Option<Vec<f64>>> = tracked
            .iter()
            .map(|s| self.history.returns_for(s, now))
            .collect();

        let n = tracked.len();
        let mut rho = DMatrix::zeros(n, n);
        for i in 0..n {
            rho[(i, i)] = 1.0;
            for j in (i + 1)..n {
                let r = match (&returns[i], &returns[j]) {
                    (Some(a), Some(b)) => pearson(a, b).unwrap_or(0.0),
                    _ => 0.0,
                };
                rho[(i, j)] = r;
                rho[(j, i)] = r;
            }
        }

        let index = tracked
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();

        let matrix = Arc::new(CorrelationMatrix {
            symbols: tracked,
            index,
            rho,
            computed_at: now,
        });
        *self.matrix.write().expect("matrix lock poisoned") = matrix;
        tracing::debug!(symbols = n, "correlation matrix recomputed");
    }

    /// Correlation of the notional-weighted portfolio return series against
    /// the benchmark's returns. 0 when either series is unavailable.
    pub fn portfolio_beta(&self, positions: &[Position], now: DateTime<Utc>) -> f64 {
        let Some(portfolio) = self.portfolio_returns(positions, now) else {
            return 0.0;
        };
        let Some(benchmark) = self.history.returns_for(&self.benchmark, now) else {
            return 0.0;
        };
        pearson(&portfolio, &benchmark).unwrap_or(0.0)
    }

    /// Parametric one-period VaR at 95%: z * sigma(portfolio returns) * gross.
    pub fn var_95(&self, positions: &[Position], now: DateTime<Utc>) -> f64 {
        let gross: f64 = positions
            .iter()
            .filter_map(|p| p.notional.abs().to_f64())
            .sum();
        let Some(returns) = self.portfolio_returns(positions, now) else {
            return 0.0;
        };
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        z_95() * var.sqrt() * gross
    }

    fn portfolio_returns(&self, positions: &[Position], now: DateTime<Utc>) -> Option<Vec<f64>> {
        let gross: f64 = positions
            .iter()
            .filter_map(|p| p.notional.abs().to_f64())
            .sum();
        if gross <= 0.0 {
            return None;
        }

        let mut combined: Option<Vec<f64>> = None;
        for position in positions {
            let weight = position.notional.abs().to_f64().unwrap_or(0.0) / gross;
            let Some(returns) = self.history.returns_for(&position.symbol, now) else {
                continue;
            };
            match &mut combined {
                None => {
                    combined = Some(returns.iter().map(|r| r * weight).collect());
                }
                Some(acc) => {
                    let len = acc.len().min(returns.len());
                    acc.truncate(len);
                    for (a, r) in acc.iter_mut().zip(returns.iter().take(len)) {
                        *a += r * weight;
                    }
                }
            }
        }
        combined.filter(|c| c.len() >= 2)
    }
}

fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

/// Pearson correlation over the common prefix of two series.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let a = &a[..n];
    let b = &b[..n];
    let nf = n as f64;
    let mean_a = a.iter().sum::<f64>() / nf;
    let mean_b = b.iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}
