// src/core/commands/route.rs

use super::{
    ExecutableCommand, ExecutionContext, ParseCommand, name_command, rename_command, unit_command,
};
use crate::core::BrokerError;
use crate::core::protocol::{BodyReader, BodyWriter};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteCreate {
    pub name: String,
    pub flags: u32,
}

impl ParseCommand for RouteCreate {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(RouteCreate {
            name: body.read_name()?,
            flags: body.read_u32()?,
        })
    }
}

impl ExecutableCommand for RouteCreate {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.route_create(&self.name, self.flags)?;
        Ok(Bytes::new())
    }
}

name_command!(RouteExist);

impl ExecutableCommand for RouteExist {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        Ok(Bytes::from(vec![ctx.broker.route_exist(&self.name) as u8]))
    }
}

unit_command!(RouteList);

impl ExecutableCommand for RouteList {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let routes = ctx.broker.route_list();
        let mut w = BodyWriter::new();
        w.put_count(routes.len());
        for r in routes {
            w.put_name(&r.name).put_u32(r.flags).put_u32(r.keys);
        }
        Ok(w.freeze())
    }
}

name_command!(RouteKeys);

impl ExecutableCommand for RouteKeys {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let keys = ctx.broker.route_keys(&self.name)?;
        let mut w = BodyWriter::new();
        w.put_count(keys.len());
        for (key, queues) in keys {
            w.put_string(&key).put_count(queues.len());
            for queue in queues {
                w.put_name(&queue);
            }
        }
        Ok(w.freeze())
    }
}

rename_command!(RouteRename);

impl ExecutableCommand for RouteRename {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.route_rename(&self.from, &self.to)?;
        Ok(Bytes::new())
    }
}

/// Generates the `route_bind` / `route_unbind` body: route, queue, routing key.
macro_rules! binding_command {
    ($ty:ident) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty {
            pub name: String,
            pub queue: String,
            pub key: String,
        }

        impl ParseCommand for $ty {
            fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
                Ok(Self {
                    name: body.read_name()?,
                    queue: body.read_name()?,
                    key: body.read_string()?,
                })
            }
        }
    };
}

binding_command!(RouteBind);

impl ExecutableCommand for RouteBind {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.route_bind(&self.name, &self.queue, &self.key)?;
        Ok(Bytes::new())
    }
}

binding_command!(RouteUnbind);

impl ExecutableCommand for RouteUnbind {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.route_unbind(&self.name, &self.queue, &self.key)?;
        Ok(Bytes::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutePush {
    pub name: String,
    pub key: String,
    pub expire_ms: u32,
    pub payload: Bytes,
}

impl ParseCommand for RoutePush {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(RoutePush {
            name: body.read_name()?,
            key: body.read_string()?,
            expire_ms: body.read_u32()?,
            payload: body.read_blob()?,
        })
    }
}

impl ExecutableCommand for RoutePush {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let accepted =
            ctx.broker
                .route_push(&self.name, &self.key, self.expire_ms, self.payload, ctx.now)?;
        Ok(Bytes::copy_from_slice(&accepted.to_be_bytes()))
    }
}

name_command!(RouteDelete);

impl ExecutableCommand for RouteDelete {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.route_delete(&self.name)?;
        Ok(Bytes::new())
    }
}
