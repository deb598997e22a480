use dotenv::dotenv;
use eyre::Result;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;

use evm_alert_agents::alerts::AlertManager;
use evm_alert_agents::config::{AppConfig, LoggingConfig};
use evm_alert_agents::listener::{connect, watch_chain, RpcChain};
use evm_alert_agents::{ChainEvent, MonitorState};

fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = match config.level.as_deref() {
        Some(level) => Level::from_str(level)?,
        None => Level::INFO,
    };

    match &config.directory {
        Some(directory) => {
            let file_appender = tracing_appender::rolling::daily(directory, "agents.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_max_level(level).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // 1. Load Config
    let config_name = std::env::var("AGENT_CONFIG").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load(&config_name)?;
    let _guard = init_logging(&config.logging)?;

    info!("Starting EVM alert agents");
    let engine = Arc::new(config.build_engine()?);
    let registry = Arc::new(engine.registry());
    let watched = engine.watched_addresses();

    info!("Configuration Loaded:");
    info!("  RPC URL: [HIDDEN]");
    info!("  Chain ID: {}", config.chain.chain_id);
    info!("  Agents: {}", engine.len());
    info!("  Events decoded: {}", registry.len());
    info!("  Watched contracts: {}", watched.len());
    info!("  Webhook: {}", if config.alerts.webhook_url.is_empty() { "Disabled" } else { "Enabled" });

    // 2. Setup Components
    let provider = Arc::new(connect(&config.chain.rpc_url).await?);
    let chain = Arc::new(RpcChain::new(provider.as_ref().clone()));
    let state = Arc::new(MonitorState::new());
    let alert_manager = Arc::new(AlertManager::new(config.alerts.clone()));

    let current = chain.latest_block().await?;
    engine.initialize(current, chain.as_ref(), &state).await?;
    info!("Agents initialized at block {}", current);

    // 3. Spawn Tasks with Backpressure
    let (tx, mut rx) = mpsc::channel(100);

    // Task A: Chain Watcher (Producer)
    tokio::spawn(async move {
        if let Err(e) = watch_chain(provider, registry, watched, tx).await {
            error!("Chain watcher failed: {}", e);
        }
    });

    // Task B: Orchestrator (Consumer)
    info!("Agents Active. Waiting for blocks...");
    let consumer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let report = match &event {
                ChainEvent::Block(block) => {
                    engine.process_block(block, chain.as_ref(), &state).await
                }
                ChainEvent::Transaction(transaction) => {
                    engine.process_transaction(transaction, chain.as_ref(), &state).await
                }
            };
            if !report.failures.is_empty() {
                warn!(failures = report.failures.len(), "Unit of work completed with agent failures");
            }
            for finding in &report.findings {
                alert_manager.emit(finding).await;
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        _ = consumer => warn!("Event stream closed"),
    }

    Ok(())
}
