use chat_ledger::{api::start_server, Config, LedgerEngine};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Environment (and .env) is read here
    let config = Config::load()?;

    info!("🚀 Chat Ledger - Webhook Server");
    info!("📍 Port: {}", config.port);
    info!(
        senders = config.allowed_senders.len(),
        ttl = ?config.state_ttl,
        timeout = ?config.external_timeout,
        "Configuration loaded"
    );

    let engine = Arc::new(LedgerEngine::from_config(&config)?);

    info!("✅ Engine initialized");
    info!("📡 Starting webhook server...");

    start_server(engine, config.port).await?;

    Ok(())
}
