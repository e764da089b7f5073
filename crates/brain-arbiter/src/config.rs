use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Runtime configuration for the Brain, loaded from the environment.
#[derive(Debug, Clone)]
pub struct BrainConfig {
    // Ingress
    pub bind_addr: String,
    /// Shared secret signing intent signals (HMAC-SHA256).
    pub signal_secret: String,
    /// Operator key guarding the operator surface.
    pub operator_api_key: String,
    /// Sustained signals per second allowed per phase queue.
    pub rate_limit_per_phase: u32,

    // Egress
    pub engine_base_url: String,
    pub engine_secret: String,
    pub wallet_base_url: String,
    pub wallet_secret: String,

    // Persistence
    pub database_url: String,

    // Breaker calibration
    pub breaker_min_equity: Decimal,
    pub breaker_daily_dd_limit: f64,
    pub breaker_cooldown_secs: i64,

    // Treasury
    pub reserve_floor: Decimal,
    pub sweep_target_micro: Decimal,
    pub sweep_target_small: Decimal,
    pub sweep_target_medium: Decimal,
    pub sweep_target_large: Decimal,
    pub sweep_target_institutional: Decimal,

    // Risk
    pub benchmark_symbol: String,

    // Arbiter
    pub queue_capacity: usize,
    pub refresh_interval_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_or(key, default)
        .parse::<T>()
        .with_context(|| format!("invalid value for {key}"))
}

impl BrainConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bind_addr: env_or("BRAIN_BIND_ADDR", "0.0.0.0:8090"),
            signal_secret: env::var("SIGNAL_HMAC_SECRET")
                .context("SIGNAL_HMAC_SECRET must be set")?,
            operator_api_key: env::var("OPERATOR_API_KEY")
                .context("OPERATOR_API_KEY must be set")?,
            rate_limit_per_phase: parse_env("RATE_LIMIT_PER_PHASE", "30")?,

            engine_base_url: env_or("ENGINE_BASE_URL", "http://localhost:9010"),
            engine_secret: env::var("ENGINE_HMAC_SECRET")
                .context("ENGINE_HMAC_SECRET must be set")?,
            wallet_base_url: env_or("WALLET_BASE_URL", "http://localhost:9020"),
            wallet_secret: env::var("WALLET_HMAC_SECRET")
                .context("WALLET_HMAC_SECRET must be set")?,

            database_url: env_or("DATABASE_URL", "sqlite://brain.db?mode=rwc"),

            breaker_min_equity: parse_env("BREAKER_MIN_EQUITY", "150")?,
            breaker_daily_dd_limit: parse_env("BREAKER_DAILY_DD_LIMIT", "-0.15")?,
            breaker_cooldown_secs: parse_env("BREAKER_COOLDOWN_SECS", "1800")?,

            reserve_floor: parse_env("RESERVE_FLOOR", "200")?,
            sweep_target_micro: parse_env("SWEEP_TARGET_MICRO", "1000")?,
            sweep_target_small: parse_env("SWEEP_TARGET_SMALL", "3500")?,
            sweep_target_medium: parse_env("SWEEP_TARGET_MEDIUM", "15000")?,
            sweep_target_large: parse_env("SWEEP_TARGET_LARGE", "37500")?,
            sweep_target_institutional: parse_env("SWEEP_TARGET_INSTITUTIONAL", "75000")?,

            benchmark_symbol: env_or("BENCHMARK_SYMBOL", "BTC"),

            queue_capacity: parse_env("SIGNAL_QUEUE_CAPACITY", "1024")?,
            refresh_interval_secs: parse_env("METRIC_REFRESH_SECS", "60")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.signal_secret.len() < 16 {
            anyhow::bail!("SIGNAL_HMAC_SECRET must be at least 16 characters");
        }
        if self.operator_api_key.len() < 16 {
            anyhow::bail!("OPERATOR_API_KEY must be at least 16 characters");
        }
        if self.breaker_daily_dd_limit >= 0.0 {
            anyhow::bail!("BREAKER_DAILY_DD_LIMIT must be negative");
        }
        if self.reserve_floor < Decimal::ZERO {
            anyhow::bail!("RESERVE_FLOOR must be non-negative");
        }
        if self.rate_limit_per_phase == 0 {
            anyhow::bail!("RATE_LIMIT_PER_PHASE must be positive");
        }
        Ok(())
    }

    pub fn tier_targets(&self) -> capital_flow::TierTargets {
        capital_flow::TierTargets {
            micro: self.sweep_target_micro,
            small: self.sweep_target_small,
            medium: self.sweep_target_medium,
            large: self.sweep_target_large,
            institutional: self.sweep_target_institutional,
        }
    }
}
