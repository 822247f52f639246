use anyhow::Context;
use fluida_core::chain::SolanaRpcClient;
use fluida_core::config::WatcherConfig;
use fluida_core::db::Postgres;
use fluida_core::AppState;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_MAX_DB_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fluida_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatcherConfig::from_env().context("failed to load watcher config")?;

    tracing::info!(
        rpc_url = %config.rpc_url,
        token = %config.token.symbol,
        mint = %config.token.mint,
        interval = ?config.poll_interval,
        "Configuration loaded"
    );

    let database_url = env::var("FLUIDA_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .context("DATABASE_URL is not set")?;

    let db = Postgres::connect(&database_url, DEFAULT_MAX_DB_CONNECTIONS).await?;
    let chain = SolanaRpcClient::new(&config.rpc_url, config.rpc_timeout)?;

    let (state, handle) = AppState::init(db, chain, config)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    handle.shutdown().await;
    state.db.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
