// src/core/queue/message.rs

use bytes::Bytes;
use tokio::time::Instant;

/// Approximate bookkeeping cost of a stored message beyond its payload.
pub const MESSAGE_OVERHEAD: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Broker-wide insertion sequence; doubles as the confirm tag.
    pub seq: u64,
    pub payload: Bytes,
    pub expires_at: Option<Instant>,
    /// Set once the message has been requeued after an unconfirmed delivery timed out.
    pub retried: bool,
}

impl Message {
    pub fn new(seq: u64, payload: Bytes, expires_at: Option<Instant>) -> Self {
        Self {
            seq,
            payload,
            expires_at,
            retried: false,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
