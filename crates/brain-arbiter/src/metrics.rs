//! Rolling operational metrics for the Brain.
//!
//! Counters are plain atomics; decision latency keeps a bounded window of
//! samples so percentiles reflect recent behaviour.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use brain_core::PhaseId;
use serde::Serialize;

const LATENCY_WINDOW: usize = 2048;

#[derive(Default)]
struct PhaseCounters {
    decided: AtomicU64,
    approved: AtomicU64,
}

pub struct BrainMetrics {
    phases: [PhaseCounters; 3],
    queue_depths: [AtomicUsize; 3],
    fills: AtomicU64,
    send_failures: AtomicU64,
    duplicates: AtomicU64,
    latencies_us: Mutex<VecDeque<u64>>,
    modifiers: Mutex<[f64; 3]>,
}

impl Default for BrainMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BrainMetrics {
    pub fn new() -> Self {
        Self {
            phases: Default::default(),
            queue_depths: Default::default(),
            fills: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            latencies_us: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
            modifiers: Mutex::new([1.0; 3]),
        }
    }

    pub fn record_decision(&self, phase: PhaseId, approved: bool, latency_us: u64) {
        let counters = &self.phases[phase.index()];
        counters.decided.fetch_add(1, Ordering::Relaxed);
        if approved {
            counters.approved.fetch_add(1, Ordering::Relaxed);
        }
        let mut window = self.latencies_us.lock().expect("metrics lock poisoned");
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency_us);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fill(&self) {
        self.fills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, phase: PhaseId, depth: usize) {
        self.queue_depths[phase.index()].store(depth, Ordering::Relaxed);
    }

    pub fn set_modifiers(&self, modifiers: [f64; 3]) {
        *self.modifiers.lock().expect("metrics lock poisoned") = modifiers;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latencies = {
            let window = self.latencies_us.lock().expect("metrics lock poisoned");
            let mut v: Vec<u64> = window.iter().copied().collect();
            v.sort_unstable();
            v
        };
        let pct = |p: f64| -> u64 {
            if latencies.is_empty() {
                return 0;
            }
            let idx = ((latencies.len() as f64 - 1.0) * p).round() as usize;
            latencies[idx]
        };

        let phase = |i: usize| PhaseSnapshot {
            decided: self.phases[i].decided.load(Ordering::Relaxed),
            approved: self.phases[i].approved.load(Ordering::Relaxed),
            queue_depth: self.queue_depths[i].load(Ordering::Relaxed),
            modifier: self.modifiers.lock().expect("metrics lock poisoned")[i],
        };

        MetricsSnapshot {
            latency_p50_us: pct(0.50),
            latency_p95_us: pct(0.95),
            latency_p99_us: pct(0.99),
            latency_samples: latencies.len(),
            p1: phase(0),
            p2: phase(1),
            p3: phase(2),
            fills: self.fills.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseSnapshot {
    pub decided: u64,
    pub approved: u64,
    pub queue_depth: usize,
    pub modifier: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_samples: usize,
    pub p1: PhaseSnapshot,
    pub p2: PhaseSnapshot,
    pub p3: PhaseSnapshot,
    pub fills: u64,
    pub send_failures: u64,
    pub duplicates: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_come_from_the_window() {
        let metrics = BrainMetrics::new();
        for i in 1..=100u64 {
            metrics.record_decision(PhaseId::P1, i % 2 == 0, i * 1000);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.latency_samples, 100);
        assert!(snap.latency_p50_us >= 49_000 && snap.latency_p50_us <= 52_000);
        assert!(snap.latency_p99_us >= 99_000);
        assert_eq!(snap.p1.decided, 100);
        assert_eq!(snap.p1.approved, 50);
    }

    #[test]
    fn window_is_bounded() {
        let metrics = BrainMetrics::new();
        for i in 0..(LATENCY_WINDOW as u64 + 500) {
            metrics.record_decision(PhaseId::P2, true, i);
        }
        assert_eq!(metrics.snapshot().latency_samples, LATENCY_WINDOW);
    }
}
