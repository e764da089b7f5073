pub mod correlation;
pub mod guardian;
pub mod models;
pub mod positions;
#[cfg(test)]
mod tests;

pub use correlation::{CorrelationEngine, CorrelationMatrix, PriceHistory};
pub use guardian::{GuardianConfig, RiskGuardian};
pub use models::GuardianDecision;
pub use positions::{PositionsHandle, PositionsSnapshot};
