//! Market ledger node binary

use anyhow::Context;
use market_ledger::external::{InMemoryAttestation, InMemoryCustody, SystemClock};
use market_ledger::{Collaborators, Config, Ledger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting market ledger node");

    // Load configuration
    let config = match std::env::var("MARKET_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading config from {}", path))?,
        Err(_) => Config::from_env().context("loading config from environment")?,
    };

    let clock = Arc::new(SystemClock);
    let collaborators = Collaborators {
        attestation: Arc::new(InMemoryAttestation::new(clock.clone())),
        custody: Arc::new(InMemoryCustody::new()),
        clock,
    };

    let ledger = Ledger::open(config.clone(), collaborators).await?;
    let created = ledger.bootstrap(&config.bootstrap).await?;
    for market in &created {
        tracing::info!(market = %market, "Market ready");
    }

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down market ledger node");
    ledger.shutdown().await?;
    Ok(())
}
