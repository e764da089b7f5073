pub mod models;
pub mod tracker;
#[cfg(test)]
mod tests;

pub use models::{PhaseAggregates, TradeRecord};
pub use tracker::PerformanceTracker;
