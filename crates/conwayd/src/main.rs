//! conwayd — Conway job dispatcher daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use conway_core::ConwayConfig;
use conway_services::{
    serve, HttpSink, NullSink, RetryPolicy, ServiceContext, TcpEngineClient, TelemetryEmitter,
};

/// How long the telemetry flusher gets to drain its queue at exit.
const TELEMETRY_DRAIN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load config
    if let Err(e) = ConwayConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ConwayConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        let mut config = ConwayConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    });

    let host_node = host_node();
    tracing::info!(
        host_node = %host_node,
        mpi = %config.engines.mpi.addr(),
        spark = %config.engines.spark.addr(),
        "conwayd starting"
    );

    // ── Telemetry ────────────────────────────────────────────────────────────
    let policy = RetryPolicy::from_config(&config.telemetry);
    let capacity = config.telemetry.queue_capacity;
    let (telemetry, flusher) = if config.telemetry.enabled {
        let sink = HttpSink::new(&config.telemetry).context("failed to build telemetry sink")?;
        tracing::info!(endpoint = sink.endpoint(), "telemetry enabled");
        TelemetryEmitter::spawn(sink, capacity, policy)
    } else {
        tracing::info!("telemetry disabled");
        TelemetryEmitter::spawn(NullSink, capacity, policy)
    };

    // ── Dispatcher ───────────────────────────────────────────────────────────
    let engine = TcpEngineClient::new(config.engines.clone(), &config.dispatch);
    let ctx = Arc::new(ServiceContext::new(
        engine,
        telemetry.clone(),
        &config.dispatch,
        host_node,
    ));

    let bind_addr = format!("{}:{}", config.listen.host, config.listen.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let server_task = tokio::spawn(serve(listener, ctx.clone(), shutdown_tx.subscribe()));

    // ── Wait for exit ────────────────────────────────────────────────────────
    match server_task.await {
        Ok(Ok(())) => tracing::info!("shutting down"),
        Ok(Err(e)) => tracing::error!(error = %e, "dispatcher failed"),
        Err(e) => tracing::error!(error = %e, "dispatcher task panicked"),
    }

    // No new engine calls past this point; in-flight ones finish.
    ctx.dispatch.close();
    flusher.shutdown(TELEMETRY_DRAIN_GRACE).await;

    let stats = telemetry.stats();
    tracing::info!(
        delivered = stats.delivered(),
        failed = stats.failed(),
        dropped = stats.dropped(),
        "telemetry summary"
    );

    Ok(())
}

fn host_node() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to resolve host name");
            "unknown".to_string()
        }
    }
}
