// src/server/context.rs

use super::LogReloadHandle;
use crate::config::Config;
use crate::core::engine::{Engine, EngineHandle};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub config: Config,
    pub config_path: String,
    pub log_reload_handle: LogReloadHandle,
    /// Taken by the spawner when the engine task starts.
    pub engine: Option<Engine>,
    pub engine_handle: EngineHandle,
    pub listener: TcpListener,
    pub unix_listener: Option<UnixListener>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub acceptor: Option<TlsAcceptor>,
}
