pub mod cache;
pub mod engine;
#[cfg(test)]
mod tests;

pub use cache::{AllocationOverride, CachedAllocator};
pub use engine::{max_leverage, tier, weights, WeightVector};
