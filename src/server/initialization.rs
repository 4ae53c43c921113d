// src/server/initialization.rs

//! Handles the server initialization process: TLS, snapshot loading, the engine and
//! the listeners.

use super::LogReloadHandle;
use super::context::ServerContext;
use crate::config::Config;
use crate::core::broker::{Broker, BrokerSettings};
use crate::core::engine::{Engine, EngineOptions};
use crate::core::persistence;
use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(
    config: Config,
    config_path: String,
    log_reload_handle: LogReloadHandle,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let acceptor = setup_tls(&config)?;
    let broker = load_broker(&config)?;

    let (engine, engine_handle) = Engine::new(
        broker,
        EngineOptions {
            storage_timeout: config.persistence.storage_timeout,
            save_on_shutdown: config.persistence.save_on_shutdown,
        },
    );

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!("Harrier listening on {}:{}", config.host, config.port);

    let unix_listener = match &config.unix_socket {
        Some(path) => Some(bind_unix_socket(path, config.unix_socket_perm)?),
        None => None,
    };

    Ok(ServerContext {
        config,
        config_path,
        log_reload_handle,
        engine: Some(engine),
        engine_handle,
        listener,
        unix_listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        acceptor,
    })
}

/// Builds the broker, restores the snapshot if one exists and makes sure the
/// administrator account is present.
fn load_broker(config: &Config) -> Result<Broker> {
    let mut broker = Broker::new(BrokerSettings::from(config));
    let path = std::path::Path::new(&config.persistence.storage_path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow!(
                "Failed to create persistence directory '{}': {}",
                parent.display(),
                e
            )
        })?;
        info!("Created persistence directory: {}", parent.display());
    }

    if let Some(snapshot) = persistence::load_snapshot(&config.persistence.storage_path)? {
        snapshot.restore_into(&mut broker, Instant::now())?;
        info!(
            "Snapshot restored: {} users, {} queues, {} routes, {} channels.",
            broker.users.len(),
            broker.queues.len(),
            broker.routes.len(),
            broker.channels.len()
        );
    }
    broker.ensure_admin()?;
    broker.check_memory();
    Ok(broker)
}

/// Binds the Unix domain socket listener, replacing a stale socket file.
fn bind_unix_socket(path: &str, perm: u32) -> Result<UnixListener> {
    if std::path::Path::new(path).exists() {
        warn!("Removing stale Unix socket file at {}", path);
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket file '{path}'"))?;
    }
    let listener =
        UnixListener::bind(path).with_context(|| format!("Failed to bind Unix socket '{path}'"))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(perm))
        .with_context(|| format!("Failed to set permissions on '{path}'"))?;
    info!("Harrier listening on unix:{} (mode {:o})", path, perm);
    Ok(listener)
}

/// Sets up the TLS acceptor if TLS is enabled in the configuration.
fn setup_tls(config: &Config) -> Result<Option<TlsAcceptor>> {
    if config.tls.enabled {
        info!("TLS is enabled. Loading certificate and key.");
        let certs = load_certs(&config.tls.cert_path)?;
        let key = load_key(&config.tls.key_path)?;
        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
    } else {
        Ok(None)
    }
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open certificate file '{}': {}", path, e))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(anyhow!("No certificates found in '{}'", path));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open private key file '{}': {}", path, e))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow!("No private key found in key file '{}'", path))
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    match config.max_memory {
        Some(limit) if limit > 0 => info!(
            "Memory limit set to {} bytes ({:.2} MB).",
            limit,
            limit as f64 / 1024.0 / 1024.0
        ),
        _ => warn!("No 'max_memory' limit is active. Broker memory is unbounded."),
    }
    info!(
        "Accepting up to {} clients; confirm timeout {:?}.",
        config.max_clients, config.limits.confirm_timeout
    );
}
