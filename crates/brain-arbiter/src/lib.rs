//! The Arbiter: the single authoritative gate between strategy intent and
//! real orders. Accepts signals from the three phase producers, runs each
//! through the breaker gate, allocation sizing, performance modifier and the
//! Risk Guardian, persists exactly one decision per signal, and forwards
//! approvals to the execution engine.

pub mod account;
pub mod arbiter;
pub mod config;
pub mod context;
pub mod fills;
pub mod loops;
pub mod metrics;
pub mod pipeline;
pub mod recovery;

pub use account::AccountState;
pub use arbiter::{Arbiter, ArbiterHandle, SignalJob};
pub use config::BrainConfig;
pub use context::BrainContext;
pub use metrics::BrainMetrics;
