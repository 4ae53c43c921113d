// src/core/commands/user.rs

use super::{
    ExecutableCommand, ExecutionContext, ParseCommand, name_command, rename_command, unit_command,
};
use crate::core::BrokerError;
use crate::core::protocol::{BodyReader, BodyWriter};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub struct UserCreate {
    pub name: String,
    pub password: String,
    pub permissions: u64,
}

impl ParseCommand for UserCreate {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(UserCreate {
            name: body.read_name()?,
            password: body.read_string()?,
            permissions: body.read_u64()?,
        })
    }
}

impl ExecutableCommand for UserCreate {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker
            .user_create(&self.name, &self.password, self.permissions)?;
        Ok(Bytes::new())
    }
}

unit_command!(UserList);

impl ExecutableCommand for UserList {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        let users = ctx.broker.user_list();
        let mut w = BodyWriter::new();
        w.put_count(users.len());
        for (name, permissions) in users {
            w.put_name(&name).put_u64(permissions.bits());
        }
        Ok(w.freeze())
    }
}

rename_command!(UserRename);

impl ExecutableCommand for UserRename {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.user_rename(&self.from, &self.to)?;
        Ok(Bytes::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSetPerm {
    pub name: String,
    pub permissions: u64,
}

impl ParseCommand for UserSetPerm {
    fn parse(body: &mut BodyReader) -> Result<Self, BrokerError> {
        Ok(UserSetPerm {
            name: body.read_name()?,
            permissions: body.read_u64()?,
        })
    }
}

impl ExecutableCommand for UserSetPerm {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.user_set_perm(&self.name, self.permissions)?;
        Ok(Bytes::new())
    }
}

name_command!(UserDelete);

impl ExecutableCommand for UserDelete {
    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
        ctx.broker.user_delete(&self.name)?;
        Ok(Bytes::new())
    }
}
