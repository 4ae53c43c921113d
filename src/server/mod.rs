// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, reload};

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;
mod stream;

pub use stream::AnyStream;

/// The reload handle of the global log filter.
pub type LogReloadHandle = Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config, config_path: String, log_reload_handle: LogReloadHandle) -> Result<()> {
    // 1. Load the snapshot, build the engine, bind the listeners.
    let mut server_context = initialization::setup(config, config_path, log_reload_handle).await?;

    // 2. Spawn the engine and the optional metrics endpoint.
    spawner::spawn_all(&mut server_context)?;

    // 3. Accept connections until a shutdown signal arrives.
    connection_loop::run(server_context).await;

    Ok(())
}
