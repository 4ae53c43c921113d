// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::engine::{EngineEvent, EngineHandle};
use crate::core::session::SessionId;
use tracing::debug;

/// Tells the engine a connection is gone when the handler's scope is exited, however
/// it exits. The engine then releases held messages and drops subscriptions.
pub struct ConnectionGuard {
    engine: EngineHandle,
    session_id: SessionId,
    addr: String,
}

impl ConnectionGuard {
    pub(crate) fn new(engine: EngineHandle, session_id: SessionId, addr: String) -> Self {
        Self {
            engine,
            session_id,
            addr,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(
            "ConnectionGuard dropping, cleaning up session {} for {}",
            self.session_id, self.addr
        );
        // A stopped engine has already discarded every session.
        let _ = self.engine.send(EngineEvent::Disconnect {
            id: self.session_id,
        });
    }
}
