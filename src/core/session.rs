// src/core/session.rs

//! The engine-side record of a connected client.
//!
//! The connection task owns the socket, the inbound decoder and the outbound write
//! cursor. The engine owns this record: identity, delivery flags and the back-references
//! needed to detach the client from every entity when it goes away.

use crate::core::acl::AuthenticatedUser;
use crate::core::protocol::Response;
use crate::core::registry::EntityId;
use indexmap::IndexSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type SessionId = u64;

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub addr: String,
    pub auth: Option<AuthenticatedUser>,
    /// The client never confirms deliveries.
    pub noack: bool,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub declared: IndexSet<EntityId>,
    pub subscribed: IndexSet<EntityId>,
    /// Channels on which the session holds at least one topic or pattern subscription.
    pub channels: IndexSet<EntityId>,
    // Dropping the sender is what tells the connection task to flush and close.
    outbound: mpsc::UnboundedSender<Response>,
}

impl Session {
    pub fn new(
        id: SessionId,
        addr: String,
        outbound: mpsc::UnboundedSender<Response>,
        now: Instant,
    ) -> Self {
        Self {
            id,
            addr,
            auth: None,
            noack: false,
            connected_at: now,
            last_activity: now,
            declared: IndexSet::new(),
            subscribed: IndexSet::new(),
            channels: IndexSet::new(),
            outbound,
        }
    }

    /// Queues a frame for the client. Returns false once the connection is gone.
    pub fn send(&self, response: Response) -> bool {
        self.outbound.send(response).is_ok()
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// A zero timeout disables idle disconnection.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        !timeout.is_zero() && now.saturating_duration_since(self.last_activity) >= timeout
    }
}
