// src/server/metrics_server.rs

//! The optional Prometheus scrape endpoint.

use crate::core::metrics::gather_metrics;
use anyhow::Context;
use axum::{Router, http::header, routing::get};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

const METRICS_PATH: &str = "/metrics";

/// The engine keeps every gauge current, so a scrape only encodes the registry.
async fn scrape() -> ([(header::HeaderName, &'static str); 1], String) {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Serves `/metrics` on `host:port` until the shutdown signal fires.
pub async fn run_metrics_server(
    host: String,
    port: u16,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {host}:{port}"))?;
    info!(
        "Prometheus metrics available at http://{}{}",
        listener.local_addr()?,
        METRICS_PATH
    );

    let app = Router::new().route(METRICS_PATH, get(scrape));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Metrics endpoint shutting down.");
        })
        .await
        .context("metrics endpoint failed")
}
