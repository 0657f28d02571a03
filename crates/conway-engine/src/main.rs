//! conway-engine — backend engine daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use conway_engine::{EngineConfig, EngineServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(
        program = %config.program,
        args = ?config.args,
        workers = config.max_workers,
        timeout_secs = config.timeout_secs,
        "conway-engine starting"
    );

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    Arc::new(EngineServer::new(&config))
        .serve(listener, shutdown_rx)
        .await
}
