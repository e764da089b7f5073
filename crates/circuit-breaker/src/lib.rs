pub mod breaker;
pub mod models;
#[cfg(test)]
mod tests;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use models::{BreakerEvent, BreakerEventKind, BreakerState, HardReason};
