// src/server/spawner.rs

//! Spawns the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns the engine and, when enabled, the metrics endpoint into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let engine = ctx
        .engine
        .take()
        .ok_or_else(|| anyhow!("engine task was already spawned"))?;
    let shutdown_rx_engine = ctx.shutdown_tx.subscribe();
    ctx.background_tasks
        .spawn(async move { engine.run(shutdown_rx_engine).await });

    if ctx.config.metrics.enabled {
        let host = ctx.config.host.clone();
        let port = ctx.config.metrics.port;
        let shutdown_rx_metrics = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run_metrics_server(host, port, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
