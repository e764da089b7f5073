//! Cached allocator with operator override.
//!
//! `weights()` is pure, so the cache only bounds recomputation frequency:
//! entries live for 60 seconds or until equity moves. An operator override
//! replaces the computed vector entirely until cleared.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use brain_core::{AllocationSnapshot, BrainError, EquityTier};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::{self, WeightVector};

const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Operator-imposed allocation, active until cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOverride {
    pub vector: WeightVector,
    pub operator_id: String,
    pub set_at: DateTime<Utc>,
}

struct CacheEntry {
    equity: Decimal,
    vector: WeightVector,
    tier: EquityTier,
    computed_at: Instant,
}

struct AllocatorState {
    cached: Option<CacheEntry>,
    active_override: Option<AllocationOverride>,
}

pub struct CachedAllocator {
    ttl: Duration,
    state: RwLock<AllocatorState>,
}

impl Default for CachedAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CachedAllocator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(AllocatorState {
                cached: None,
                active_override: None,
            }),
        }
    }

    /// Current allocation for the given equity, served from cache when fresh.
    pub fn snapshot(&self, equity: Decimal) -> AllocationSnapshot {
        let tier = engine::tier(equity);
        let max_leverage = tier.max_leverage().to_f64().unwrap_or(0.0);

        {
            let state = self.state.read().expect("allocator lock poisoned");
            if let Some(ov) = &state.active_override {
                return AllocationSnapshot {
                    w1: ov.vector.w1,
                    w2: ov.vector.w2,
                    w3: ov.vector.w3,
                    tier,
                    max_leverage,
                    override_active: true,
                };
            }
            if let Some(entry) = &state.cached {
                if entry.equity == equity && entry.computed_at.elapsed() < self.ttl {
                    return AllocationSnapshot {
                        w1: entry.vector.w1,
                        w2: entry.vector.w2,
                        w3: entry.vector.w3,
                        tier: entry.tier,
                        max_leverage,
                        override_active: false,
                    };
                }
            }
        }

        let vector = engine::weights(equity);
        let mut state = self.state.write().expect("allocator lock poisoned");
        state.cached = Some(CacheEntry {
            equity,
            vector,
            tier,
            computed_at: Instant::now(),
        });
        AllocationSnapshot {
            w1: vector.w1,
            w2: vector.w2,
            w3: vector.w3,
            tier,
            max_leverage,
            override_active: false,
        }
    }

    /// Install an operator override. The vector must already be a valid
    /// allocation (unit sum, components in [0,1]).
    pub fn set_override(&self, vector: WeightVector, operator_id: &str) -> Result<(), BrainError> {
        if !vector.is_valid() {
            return Err(BrainError::MalformedSignal(format!(
                "override weights ({}, {}, {}) do not form a unit vector",
                vector.w1, vector.w2, vector.w3
            )));
        }
        let mut state = self.state.write().expect("allocator lock poisoned");
        tracing::warn!(
            operator_id,
            w1 = vector.w1,
            w2 = vector.w2,
            w3 = vector.w3,
            "allocation override installed"
        );
        state.active_override = Some(AllocationOverride {
            vector,
            operator_id: operator_id.to_string(),
            set_at: Utc::now(),
        });
        Ok(())
    }

    /// Remove an active override. Returns the override that was active.
    pub fn clear_override(&self, operator_id: &str) -> Option<AllocationOverride> {
        let mut state = self.state.write().expect("allocator lock poisoned");
        let prev = state.active_override.take();
        if prev.is_some() {
            tracing::warn!(operator_id, "allocation override cleared");
        }
        prev
    }

    pub fn override_active(&self) -> bool {
        self.state
            .read()
            .expect("allocator lock poisoned")
            .active_override
            .is_some()
    }

    /// Drop the cached entry so the next snapshot recomputes.
    pub fn invalidate(&self) {
        let mut state = self.state.write().expect("allocator lock poisoned");
        state.cached = None;
    }
}
