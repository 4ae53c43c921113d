// src/core/commands/queue.rs

use super::{
    ExecutableCommand, ExecutionContext, ParseCommand, name_command, rename_command, unit_command,
};
use crate::core::BrokerError;
use crate::core::protocol::{BodyReader, BodyWriter};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub struct QueueCreate {
    pub name: String,
    pub max_msg: u32,
    pub max_msg_size: u32,
    pub flags: u32,
}

impl ParseCommand for QueueCreate {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(QueueCreate {
            name: body.read_name()?,
            max_msg: body.read_u32()?,
            max_msg_size: body.read_u32()?,
            flags: body.read_u32()?,
        })
    }
}

impl ExecutableCommand for QueueCreate {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker
            .queue_create(&self.name, self.max_msg, self.max_msg_size, self.flags)?;
        Ok(Bytes::new())
    }
}

name_command!(QueueDeclare);

impl ExecutableCommand for QueueDeclare {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.queue_declare(ctx.session, &self.name)?;
        Ok(Bytes::new())
    }
}

name_command!(QueueExist);

impl ExecutableCommand for QueueExist {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let exists = ctx.broker.queue_exist(&self.name);
        Ok(Bytes::from(vec![exists as u8]))
    }
}

unit_command!(QueueList);

impl ExecutableCommand for QueueList {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let queues = ctx.broker.queue_list();
        let mut w = BodyWriter::new();
        w.put_count(queues.len());
        for q in queues {
            w.put_name(&q.name)
                .put_u32(q.max_msg)
                .put_u32(q.max_msg_size)
                .put_u32(q.flags)
                .put_u32(q.size)
                .put_u32(q.declared)
                .put_u32(q.subscribers);
        }
        Ok(w.freeze())
    }
}

rename_command!(QueueRename);

impl ExecutableCommand for QueueRename {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.queue_rename(&self.from, &self.to)?;
        Ok(Bytes::new())
    }
}

name_command!(QueueSize);

impl ExecutableCommand for QueueSize {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let size = ctx.broker.queue_size(&self.name)?;
        Ok(Bytes::copy_from_slice(&(size as u32).to_be_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePush {
    pub name: String,
    /// 0 means the message never expires.
    pub expire_ms: u32,
    pub payload: Bytes,
}

impl ParseCommand for QueuePush {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(QueuePush {
            name: body.read_name()?,
            expire_ms: body.read_u32()?,
            payload: body.read_blob()?,
        })
    }
}

impl ExecutableCommand for QueuePush {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker
            .queue_push(&self.name, self.expire_ms, self.payload, ctx.now)?;
        Ok(Bytes::new())
    }
}

name_command!(QueueGet);

impl ExecutableCommand for QueueGet {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let delivered = ctx.broker.queue_get(ctx.session, &self.name, ctx.now)?;
        let mut w = BodyWriter::new();
        w.put_u64(delivered.tag).put_blob(&delivered.payload);
        Ok(w.freeze())
    }
}

name_command!(QueuePop);

impl ExecutableCommand for QueuePop {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let delivered = ctx.broker.queue_pop(ctx.session, &self.name, ctx.now)?;
        let mut w = BodyWriter::new();
        w.put_blob(&delivered.payload);
        Ok(w.freeze())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfirm {
    pub name: String,
    pub tag: u64,
}

impl ParseCommand for QueueConfirm {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(QueueConfirm {
            name: body.read_name()?,
            tag: body.read_u64()?,
        })
    }
}

impl ExecutableCommand for QueueConfirm {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker
            .queue_confirm(ctx.session, &self.name, self.tag)?;
        Ok(Bytes::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueSubscribe {
    pub name: String,
    /// 1 = message, 2 = notify.
    pub mode: u8,
}

impl ParseCommand for QueueSubscribe {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(QueueSubscribe {
            name: body.read_name()?,
            mode: body.read_u8()?,
        })
    }
}

impl ExecutableCommand for QueueSubscribe {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker
            .queue_subscribe(ctx.session, &self.name, self.mode)?;
        Ok(Bytes::new())
    }
}

name_command!(QueueUnsubscribe);

impl ExecutableCommand for QueueUnsubscribe {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.queue_unsubscribe(ctx.session, &self.name)?;
        Ok(Bytes::new())
    }
}

name_command!(QueuePurge);

impl ExecutableCommand for QueuePurge {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.queue_purge(&self.name)?;
        Ok(Bytes::new())
    }
}

name_command!(QueueDelete);

impl ExecutableCommand for QueueDelete {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.queue_delete(&self.name)?;
        Ok(Bytes::new())
    }
}
