// src/core/commands/connection.rs

//! Connection lifecycle and administrative commands.

use super::{ExecutableCommand, ExecutionContext, ParseCommand, unit_command};
use crate::core::BrokerError;
use crate::core::persistence;
use crate::core::protocol::{BodyReader, BodyWriter};
use bytes::Bytes;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct Auth {
    pub name: String,
    pub password: String,
    /// Session flags; bit 0 requests noack delivery.
    pub flags: u8,
}

impl ParseCommand for Auth {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(Auth {
            name: body.read_name()?,
            password: body.read_string()?,
            flags: body.read_opt_u8().unwrap_or(0),
        })
    }
}

impl ExecutableCommand for Auth {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker
            .auth(ctx.session, &self.name, &self.password, self.flags)?;
        Ok(Bytes::new())
    }
}

unit_command!(Ping);

impl ExecutableCommand for Ping {
    fn execute(self, _ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        Ok(Bytes::new())
    }
}

unit_command!(Stat);

impl ExecutableCommand for Stat {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let stats = ctx.broker.stats(ctx.now);
        let mut w = BodyWriter::new();
        w.put_string(stats.version)
            .put_u64(stats.uptime_secs)
            .put_u64(stats.used_memory)
            .put_u32(stats.clients)
            .put_u32(stats.users)
            .put_u32(stats.queues)
            .put_u32(stats.routes)
            .put_u32(stats.channels)
            .put_u64(stats.last_save)
            .put_u64(stats.commands_processed);
        Ok(w.freeze())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Save {
    pub background: bool,
}

impl ParseCommand for Save {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(Save {
            background: body.read_u8()? != 0,
        })
    }
}

impl ExecutableCommand for Save {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        if self.background {
            if !persistence::spawn_background_save(ctx.broker) {
                return Err(BrokerError::Persistence(
                    "a background save is already in progress".into(),
                ));
            }
        } else {
            persistence::save_blocking(ctx.broker)?;
        }
        Ok(Bytes::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    pub mask: u32,
}

impl ParseCommand for Flush {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(Flush {
            mask: body.read_u32()?,
        })
    }
}

impl ExecutableCommand for Flush {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.flush(self.mask)?;
        Ok(Bytes::new())
    }
}

unit_command!(Disconnect);

impl ExecutableCommand for Disconnect {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        info!("Session {} requested disconnect.", ctx.session);
        ctx.close_after_reply = true;
        Ok(Bytes::new())
    }
}
