// src/core/commands/channel.rs

use super::{
    ExecutableCommand, ExecutionContext, ParseCommand, name_command, rename_command, unit_command,
};
use crate::core::BrokerError;
use crate::core::protocol::{BodyReader, BodyWriter};
use bytes::Bytes;

/// Generates a `(channel name, subject)` command, where the subject is a topic
/// or a pattern depending on the command.
macro_rules! subject_command {
    ($ty:ident, $method:ident) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty {
            pub name: String,
            pub subject: String,
        }

        impl ParseCommand for $ty {
            fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
                Ok(Self {
                    name: body.read_name()?,
                    subject: body.read_string()?,
                })
            }
        }

        impl ExecutableCommand for $ty {
            fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
                ctx.broker.$method(ctx.session, &self.name, &self.subject)?;
                Ok(Bytes::new())
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCreate {
    pub name: String,
    pub flags: u32,
}

impl ParseCommand for ChannelCreate {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(ChannelCreate {
            name: body.read_name()?,
            flags: body.read_u32()?,
        })
    }
}

impl ExecutableCommand for ChannelCreate {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.channel_create(&self.name, self.flags)?;
        Ok(Bytes::new())
    }
}

name_command!(ChannelExist);

impl ExecutableCommand for ChannelExist {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        Ok(Bytes::from(vec![ctx.broker.channel_exist(&self.name) as u8]))
    }
}

unit_command!(ChannelList);

impl ExecutableCommand for ChannelList {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let channels = ctx.broker.channel_list();
        let mut w = BodyWriter::new();
        w.put_count(channels.len());
        for c in channels {
            w.put_name(&c.name)
                .put_u32(c.flags)
                .put_u32(c.topics)
                .put_u32(c.patterns);
        }
        Ok(w.freeze())
    }
}

rename_command!(ChannelRename);

impl ExecutableCommand for ChannelRename {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.channel_rename(&self.from, &self.to)?;
        Ok(Bytes::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPublish {
    pub name: String,
    pub topic: String,
    pub payload: Bytes,
}

impl ParseCommand for ChannelPublish {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(ChannelPublish {
            name: body.read_name()?,
            topic: body.read_string()?,
            payload: body.read_blob()?,
        })
    }
}

impl ExecutableCommand for ChannelPublish {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let receivers = ctx
            .broker
            .channel_publish(&self.name, &self.topic, self.payload)?;
        Ok(Bytes::copy_from_slice(&receivers.to_be_bytes()))
    }
}

subject_command!(ChannelSubscribe, channel_subscribe);
subject_command!(ChannelPSubscribe, channel_psubscribe);
subject_command!(ChannelUnsubscribe, channel_unsubscribe);
subject_command!(ChannelPUnsubscribe, channel_punsubscribe);

name_command!(ChannelDelete);

impl ExecutableCommand for ChannelDelete {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.channel_delete(&self.name)?;
        Ok(Bytes::new())
    }
}
