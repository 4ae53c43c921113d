// src/core/commands/command_trait.rs

//! Defines the core traits for all executable commands.

use crate::core::BrokerError;
use crate::core::broker::Broker;
use crate::core::protocol::BodyReader;
use crate::core::session::SessionId;
use bytes::Bytes;
use tokio::time::Instant;

/// Everything a command may touch while it runs.
pub struct ExecutionContext<'a> {
    pub broker: &'a mut Broker,
    pub session: SessionId,
    pub now: Instant,
    /// Set by `disconnect`: the session is closed once the reply is queued.
    pub close_after_reply: bool,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(broker: &'a mut Broker, session: SessionId, now: Instant) -> Self {
        Self {
            broker,
            session,
            now,
            close_after_reply: false,
        }
    }
}

/// Decodes a command's fields from a request body.
pub trait ParseCommand: Sized {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError>;
}

/// Runs a parsed command against the broker and returns the `OK` reply body.
pub trait ExecutableCommand {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError>;
}
