// src/core/commands/mod.rs

//! This module defines all supported commands, organizes them into families,
//! and provides the central `Command` enum that encapsulates their parsed state.
//! The `define_commands!` macro generates the enum and its dispatch methods; every
//! `CommandId` must appear in it, otherwise `Command::parse` stops compiling.

use crate::core::BrokerError;
use crate::core::protocol::{BodyReader, CommandId, Request};
use bytes::Bytes;

pub use command_trait::{ExecutableCommand, ExecutionContext, ParseCommand};

pub mod channel;
pub mod command_trait;
pub mod connection;
pub mod queue;
pub mod route;
pub mod user;

/// Generates a struct holding a single `name` field and its parser.
macro_rules! name_command {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty {
            pub name: String,
        }

        impl $crate::core::commands::ParseCommand for $ty {
            fn parse(
                body: &mut $crate::core::protocol::BodyReader,
            ) -> Result<Self, $crate::core::BrokerError> {
                Ok(Self {
                    name: body.read_name()?,
                })
            }
        }
    };
}

/// Generates a struct holding `from`/`to` names and its parser.
macro_rules! rename_command {
    ($ty:ident) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty {
            pub from: String,
            pub to: String,
        }

        impl $crate::core::commands::ParseCommand for $ty {
            fn parse(
                body: &mut $crate::core::protocol::BodyReader,
            ) -> Result<Self, $crate::core::BrokerError> {
                Ok(Self {
                    from: body.read_name()?,
                    to: body.read_name()?,
                })
            }
        }
    };
}

/// Generates a field-less command and its parser.
macro_rules! unit_command {
    ($ty:ident) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $ty;

        impl $crate::core::commands::ParseCommand for $ty {
            fn parse(
                _body: &mut $crate::core::protocol::BodyReader,
            ) -> Result<Self, $crate::core::BrokerError> {
                Ok(Self)
            }
        }
    };
}

pub(crate) use {name_command, rename_command, unit_command};

macro_rules! define_commands {
    ($(($variant:ident, $module:ident)),* $(,)?) => {
        /// A fully decoded request.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Command {
            $($variant($module::$variant),)*
        }

        impl Command {
            /// Decodes the request body for its command id. Truncated, malformed or
            /// trailing fields are protocol errors.
            pub fn parse(request: Request) -> Result<Self, BrokerError> {
                let mut body = BodyReader::new(request.body);
                let command = match request.command {
                    $(CommandId::$variant => {
                        Command::$variant(<$module::$variant as ParseCommand>::parse(&mut body)?)
                    })*
                };
                body.finish()?;
                Ok(command)
            }

            pub fn id(&self) -> CommandId {
                match self {
                    $(Command::$variant(_) => CommandId::$variant,)*
                }
            }

            pub fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<Bytes, BrokerError> {
                match self {
                    $(Command::$variant(cmd) => cmd.execute(ctx),)*
                }
            }
        }
    };
}

define_commands! {
    // --- Connection / Admin ---
    (Auth, connection),
    (Ping, connection),
    (Stat, connection),
    (Save, connection),
    (Flush, connection),
    (Disconnect, connection),

    // --- Users ---
    (UserCreate, user),
    (UserList, user),
    (UserRename, user),
    (UserSetPerm, user),
    (UserDelete, user),

    // --- Queues ---
    (QueueCreate, queue),
    (QueueDeclare, queue),
    (QueueExist, queue),
    (QueueList, queue),
    (QueueRename, queue),
    (QueueSize, queue),
    (QueuePush, queue),
    (QueueGet, queue),
    (QueuePop, queue),
    (QueueConfirm, queue),
    (QueueSubscribe, queue),
    (QueueUnsubscribe, queue),
    (QueuePurge, queue),
    (QueueDelete, queue),

    // --- Routes ---
    (RouteCreate, route),
    (RouteExist, route),
    (RouteList, route),
    (RouteKeys, route),
    (RouteRename, route),
    (RouteBind, route),
    (RouteUnbind, route),
    (RoutePush, route),
    (RouteDelete, route),

    // --- Channels ---
    (ChannelCreate, channel),
    (ChannelExist, channel),
    (ChannelList, channel),
    (ChannelRename, channel),
    (ChannelPublish, channel),
    (ChannelSubscribe, channel),
    (ChannelPSubscribe, channel),
    (ChannelUnsubscribe, channel),
    (ChannelPUnsubscribe, channel),
    (ChannelDelete, channel),
}
