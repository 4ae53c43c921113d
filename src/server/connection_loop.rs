// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use super::stream::AnyStream;
use crate::config::Config;
use crate::connection::ConnectionHandler;
use crate::core::engine::EngineHandle;
use std::future;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::EnvFilter;

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();
    let max_request_size = ctx.config.limits.max_request_size;

    let (mut sigint, mut sigterm, mut sighup) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(int), Ok(term), Ok(hup)) => (int, term, hup),
        _ => {
            error!("Failed to register signal handlers. Shutting down.");
            shutdown(ctx, client_tasks).await;
            return;
        }
    };

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = sighup.recv() => reload_log_level(&ctx),

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("Accepted new connection from: {}", addr);
                        let engine = ctx.engine_handle.clone();
                        let session_id = engine.next_session_id();
                        let addr = addr.to_string();

                        if let Some(acceptor) = ctx.acceptor.clone() {
                            client_tasks.spawn(async move {
                                match acceptor.accept(socket).await {
                                    Ok(tls_stream) => {
                                        info!("TLS handshake successful for {addr}");
                                        let stream = AnyStream::Tls(Box::new(tls_stream));
                                        serve(stream, addr, engine, session_id, max_request_size).await;
                                    }
                                    Err(e) => warn!("TLS handshake error for {addr}: {e}"),
                                }
                            });
                        } else {
                            client_tasks.spawn(serve(AnyStream::Tcp(socket), addr, engine, session_id, max_request_size));
                        }
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            res = accept_unix(ctx.unix_listener.as_ref()) => {
                match res {
                    Ok(socket) => {
                        let engine = ctx.engine_handle.clone();
                        let session_id = engine.next_session_id();
                        let addr = format!("unix:{session_id}");
                        info!("Accepted new connection on the Unix socket ({})", addr);
                        client_tasks.spawn(serve(AnyStream::Unix(socket), addr, engine, session_id, max_request_size));
                    }
                    Err(e) => error!("Failed to accept Unix socket connection: {}", e),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    shutdown(ctx, client_tasks).await;
}

async fn serve(
    stream: AnyStream,
    addr: String,
    engine: EngineHandle,
    session_id: u64,
    max_request_size: usize,
) {
    let kind = stream.kind();
    debug!("Session {} uses the {} transport", session_id, kind);
    let handler = ConnectionHandler::new(stream, addr.clone(), engine, session_id, max_request_size);
    if let Err(e) = handler.run().await {
        warn!("{} connection from {} terminated unexpectedly: {}", kind, addr, e);
    }
}

/// Accepts from the Unix listener, or never resolves when none is configured.
async fn accept_unix(listener: Option<&UnixListener>) -> std::io::Result<tokio::net::UnixStream> {
    match listener {
        Some(listener) => listener.accept().await.map(|(socket, _)| socket),
        None => future::pending().await,
    }
}

/// Re-reads `log_level` from the configuration file and applies it to the log filter.
fn reload_log_level(ctx: &ServerContext) {
    let level = match Config::from_file(&ctx.config_path) {
        Ok(config) => config.log_level,
        Err(e) => {
            warn!("SIGHUP received but the configuration could not be reloaded: {:#}", e);
            return;
        }
    };
    match ctx.log_reload_handle.reload(EnvFilter::new(&level)) {
        Ok(()) => info!("SIGHUP received, log level set to '{}'.", level),
        Err(e) => warn!("Failed to apply log level '{}': {}", level, e),
    }
}

async fn shutdown(mut ctx: ServerContext, mut client_tasks: JoinSet<()>) {
    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    // The engine performs the final save before it exits; wait for it first.
    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(30), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };

    client_tasks.shutdown().await;
    info!("All client connections closed.");

    if let Some(path) = &ctx.config.unix_socket
        && let Err(e) = std::fs::remove_file(path)
    {
        warn!("Failed to remove Unix socket file '{}': {}", path, e);
    }
    info!("Server shutdown complete.");
}
