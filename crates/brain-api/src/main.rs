use std::sync::Arc;

use anyhow::{Context, Result};
use brain_arbiter::{
    account::AccountState,
    arbiter::Arbiter,
    config::BrainConfig,
    context::{breaker_from_config, capital_flow_from_config, BrainContext},
    fills, loops, recovery,
};
use capital_flow::TreasuryState;
use circuit_breaker::CircuitBreaker;
use execution_gateway::{HttpExecutionClient, HttpWalletClient};
use notification_service::WebhookNotifier;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use state_store::BrainStore;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing.
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log before crashing.
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("starting titan-brain");

    // 2. Configuration.
    let config = BrainConfig::from_env()?;
    tracing::info!("configuration loaded and validated");
    tracing::info!("  bind address: {}", config.bind_addr);
    tracing::info!("  execution engine: {}", config.engine_base_url);
    tracing::info!("  breaker floor: {}", config.breaker_min_equity);
    tracing::info!("  daily drawdown limit: {}", config.breaker_daily_dd_limit);
    tracing::info!("  reserve floor: {}", config.reserve_floor);
    tracing::info!("  rate limit: {}/s per phase", config.rate_limit_per_phase);

    // 3. Store.
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    let store = BrainStore::new(pool);
    store.init_tables().await?;
    tracing::info!("state store initialized");

    // 4. Egress clients and operator notifier.
    let engine = Arc::new(HttpExecutionClient::new(
        config.engine_base_url.clone(),
        config.engine_secret.as_bytes().to_vec(),
    )?);
    let wallet = Arc::new(HttpWalletClient::new(
        config.wallet_base_url.clone(),
        config.wallet_secret.as_bytes().to_vec(),
    )?);
    let notifier = Arc::new(WebhookNotifier::from_env());

    // 5. Restore owned state: treasury and breaker.
    let treasury = store
        .load_treasury()
        .await?
        .unwrap_or_else(|| TreasuryState::new(Decimal::ZERO, Decimal::ZERO, config.reserve_floor));
    let breaker = match store.load_breaker_state().await? {
        Some((state, flatten_pending)) => {
            tracing::info!(?state, flatten_pending, "breaker state restored");
            CircuitBreaker::restore(breaker_from_config(&config), state, flatten_pending)
        }
        None => CircuitBreaker::new(breaker_from_config(&config)),
    };
    let capital = capital_flow_from_config(&config, wallet, treasury);
    let account = AccountState::new(Decimal::ZERO, Decimal::ZERO, chrono::Utc::now());

    let bind_addr = config.bind_addr.clone();
    let ctx = Arc::new(BrainContext::new(
        config, store, breaker, capital, engine, notifier, account,
    ));

    // 6. Recovery gate: no signals are served until this finishes.
    recovery::recover(&ctx).await?;

    // 7. Spawn the arbiter and its companion loops.
    let (arbiter, handle) = Arbiter::new(ctx.clone());
    tokio::spawn(arbiter.run());

    let (fill_tx, fill_rx) = fills::fill_channel(1024);
    tokio::spawn(fills::run_fill_loop(ctx.clone(), fill_rx));
    tokio::spawn(loops::run_refresh_loop(ctx.clone()));
    tokio::spawn(loops::run_daily_loop(ctx.clone()));

    // 8. Serve the API until shutdown.
    let state = brain_api::ApiState::new(handle, fill_tx);
    brain_api::run_server(state, &bind_addr).await
}
