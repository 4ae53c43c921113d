// src/core/broker/mod.rs

//! The broker state owned by the engine task: the four registries, the live sessions,
//! admission control and persistence bookkeeping.
//!
//! Every method runs to completion against in-memory state. Nothing here blocks or
//! awaits, so no other client can observe a half-applied operation.

mod channels;
mod cleanup;
pub mod events;
mod queues;
mod routes;
mod users;

pub use channels::ChannelSummary;
pub use queues::{Delivered, QueueSummary};
pub use routes::RouteSummary;

use crate::config::Config;
use crate::core::BrokerError;
use crate::core::acl::User;
use crate::core::admission::{Admission, ENTITY_OVERHEAD, SESSION_OVERHEAD};
use crate::core::channel::Channel;
use crate::core::metrics;
use crate::core::persistence::PersistenceState;
use crate::core::protocol::{Response, MAX_NAME_LEN};
use crate::core::queue::Queue;
use crate::core::registry::Registry;
use crate::core::route::Route;
use crate::core::session::{Session, SessionId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// `flush` mask bits.
pub const FLUSH_USERS: u32 = 1;
pub const FLUSH_QUEUES: u32 = 2;
pub const FLUSH_ROUTES: u32 = 4;
pub const FLUSH_CHANNELS: u32 = 8;
const FLUSH_ALL: u32 = FLUSH_USERS | FLUSH_QUEUES | FLUSH_ROUTES | FLUSH_CHANNELS;

/// The runtime limits the engine works with, resolved from the configuration.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub admin_name: String,
    pub admin_password: String,
    pub max_clients: usize,
    /// Bytes; 0 means unlimited.
    pub max_memory: u64,
    /// Zero disables idle disconnection.
    pub client_timeout: Duration,
    pub confirm_timeout: Duration,
    pub max_message_size: usize,
    pub storage_path: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            admin_name: "admin".to_string(),
            admin_password: "admin".to_string(),
            max_clients: 16384,
            max_memory: 0,
            client_timeout: Duration::ZERO,
            confirm_timeout: Duration::from_secs(30),
            max_message_size: 16 * 1024 * 1024,
            storage_path: "harrier.dat".to_string(),
        }
    }
}

impl From<&Config> for BrokerSettings {
    fn from(config: &Config) -> Self {
        Self {
            admin_name: config.admin_name.clone(),
            admin_password: config.admin_password.clone(),
            max_clients: config.max_clients,
            max_memory: config.max_memory.unwrap_or(0),
            client_timeout: config.client_timeout,
            confirm_timeout: config.limits.confirm_timeout,
            max_message_size: config.limits.max_message_size,
            storage_path: config.persistence.storage_path.clone(),
        }
    }
}

/// The figures reported by `stat`.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerStats {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub used_memory: u64,
    pub clients: u32,
    pub users: u32,
    pub queues: u32,
    pub routes: u32,
    pub channels: u32,
    pub last_save: u64,
    pub commands_processed: u64,
}

#[derive(Debug)]
pub struct Broker {
    pub settings: BrokerSettings,
    pub users: Registry<User>,
    pub queues: Registry<Queue>,
    pub routes: Registry<Route>,
    pub channels: Registry<Channel>,
    pub admission: Admission,
    pub persistence: PersistenceState,
    sessions: HashMap<SessionId, Session>,
    next_seq: u64,
    started_at: Instant,
    commands_processed: u64,
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        let admission = Admission::new(settings.max_memory, settings.max_clients);
        let persistence = PersistenceState::new(settings.storage_path.clone());
        Self {
            settings,
            users: Registry::new("User"),
            queues: Registry::new("Queue"),
            routes: Registry::new("Route"),
            channels: Registry::new("Channel"),
            admission,
            persistence,
            sessions: HashMap::new(),
            next_seq: 1,
            started_at: Instant::now(),
            commands_processed: 0,
        }
    }

    // --- Sessions ---

    /// Registers a newly accepted connection. Fails with `TooManyClients` when the
    /// client ceiling is reached; the caller then drops `outbound`, which closes the
    /// connection without a response.
    pub fn register_session(
        &mut self,
        id: SessionId,
        addr: String,
        outbound: mpsc::UnboundedSender<Response>,
        now: Instant,
    ) -> Result<(), BrokerError> {
        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
        if let Err(e) = self.admission.admit_client(self.sessions.len()) {
            warn!("Refusing connection from {}: {}", addr, e);
            metrics::CONNECTIONS_REJECTED_TOTAL.inc();
            return Err(e);
        }
        debug!("Session {} registered for {}", id, addr);
        self.sessions.insert(id, Session::new(id, addr, outbound, now));
        metrics::CONNECTED_CLIENTS.set(self.sessions.len() as f64);
        Ok(())
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn session_or_err(&self, id: SessionId) -> Result<&Session, BrokerError> {
        self.sessions
            .get(&id)
            .ok_or_else(|| BrokerError::Internal(format!("unknown session {id}")))
    }

    pub(crate) fn session_mut_or_err(&mut self, id: SessionId) -> Result<&mut Session, BrokerError> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| BrokerError::Internal(format!("unknown session {id}")))
    }

    /// Sends a frame to a session. Returns false if the session is gone.
    pub fn send_to(&self, id: SessionId, response: Response) -> bool {
        self.sessions.get(&id).is_some_and(|s| s.send(response))
    }

    // --- Bookkeeping ---

    pub(crate) fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub(crate) fn mark_dirty(&self) {
        self.persistence.mark_dirty();
    }

    pub fn record_command(&mut self) {
        self.commands_processed += 1;
    }

    /// The engine's memory figure: stored payloads plus fixed per-entity overhead.
    pub fn used_memory(&self) -> u64 {
        let queued: usize = self.queues.iter().map(|(_, q)| q.memory_usage()).sum();
        let entities =
            self.users.len() + self.queues.len() + self.routes.len() + self.channels.len();
        (queued + entities * ENTITY_OVERHEAD + self.sessions.len() * SESSION_OVERHEAD) as u64
    }

    /// Re-evaluates the memory ceiling.
    pub fn check_memory(&mut self) {
        let used = self.used_memory();
        self.admission.observe_memory(used);
    }

    pub fn stats(&self, now: Instant) -> BrokerStats {
        BrokerStats {
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: now.saturating_duration_since(self.started_at).as_secs(),
            used_memory: self.used_memory(),
            clients: self.sessions.len() as u32,
            users: self.users.len() as u32,
            queues: self.queues.len() as u32,
            routes: self.routes.len() as u32,
            channels: self.channels.len() as u32,
            last_save: self.persistence.last_save(),
            commands_processed: self.commands_processed,
        }
    }

    /// Clears the registries selected by `mask`. Flushing users keeps the administrator.
    pub fn flush(&mut self, mask: u32) -> Result<(), BrokerError> {
        if mask & !FLUSH_ALL != 0 {
            return Err(BrokerError::InvalidArgument(format!(
                "unknown flush mask bits 0x{:x}",
                mask & !FLUSH_ALL
            )));
        }
        if mask & FLUSH_CHANNELS != 0 {
            for id in self.channels.ids() {
                self.remove_channel(id);
            }
        }
        if mask & FLUSH_ROUTES != 0 {
            for id in self.routes.ids() {
                self.remove_route(id);
            }
        }
        if mask & FLUSH_QUEUES != 0 {
            for id in self.queues.ids() {
                self.remove_queue(id);
            }
        }
        if mask & FLUSH_USERS != 0 {
            let admin = self.settings.admin_name.clone();
            for id in self.users.ids() {
                if self.users.get(id).is_some_and(|u| u.name != admin) {
                    self.users.remove(id);
                }
            }
        }
        info!("Flushed broker state (mask 0x{:x}).", mask);
        self.mark_dirty();
        Ok(())
    }
}

/// Rejects names outside the wire limits. Names decoded from frames are already
/// checked; this guards names arriving through other paths such as configuration.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<(), BrokerError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(BrokerError::InvalidArgument(format!(
            "{kind} name must be 1 to {MAX_NAME_LEN} bytes"
        )));
    }
    Ok(())
}
