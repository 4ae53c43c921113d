// src/core/protocol/command_id.rs

//! Command identifiers, response statuses and error tags as they appear on the wire.

use bitflags::bitflags;
use strum_macros::{Display, EnumIter, FromRepr, IntoStaticStr};

/// The one-byte command identifier carried in every request and response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum CommandId {
    Auth = 0x01,
    Ping = 0x02,
    Stat = 0x03,
    Save = 0x04,
    Flush = 0x05,
    Disconnect = 0x06,

    UserCreate = 0x10,
    UserList = 0x11,
    UserRename = 0x12,
    UserSetPerm = 0x13,
    UserDelete = 0x14,

    QueueCreate = 0x20,
    QueueDeclare = 0x21,
    QueueExist = 0x22,
    QueueList = 0x23,
    QueueRename = 0x24,
    QueueSize = 0x25,
    QueuePush = 0x26,
    QueueGet = 0x27,
    QueuePop = 0x28,
    QueueConfirm = 0x29,
    QueueSubscribe = 0x2A,
    QueueUnsubscribe = 0x2B,
    QueuePurge = 0x2C,
    QueueDelete = 0x2D,

    RouteCreate = 0x30,
    RouteExist = 0x31,
    RouteList = 0x32,
    RouteKeys = 0x33,
    RouteRename = 0x34,
    RouteBind = 0x35,
    RouteUnbind = 0x36,
    RoutePush = 0x37,
    RouteDelete = 0x38,

    ChannelCreate = 0x40,
    ChannelExist = 0x41,
    ChannelList = 0x42,
    ChannelRename = 0x43,
    ChannelPublish = 0x44,
    ChannelSubscribe = 0x45,
    ChannelPSubscribe = 0x46,
    ChannelUnsubscribe = 0x47,
    ChannelPUnsubscribe = 0x48,
    ChannelDelete = 0x49,
}

bitflags! {
    /// Properties of a command that the dispatcher consults before running it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommandFlags: u32 {
        /// The command grows broker state and is refused while the memory ceiling is
        /// exceeded.
        const DENY_OOM = 1 << 0;
    }
}

impl CommandId {
    /// Returns the lowercase command name, e.g. `queue_push`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn flags(self) -> CommandFlags {
        use CommandId::*;
        match self {
            UserCreate | QueueCreate | QueueDeclare | QueuePush | QueueSubscribe | RouteCreate
            | RouteBind | RoutePush | ChannelCreate | ChannelSubscribe | ChannelPSubscribe => {
                CommandFlags::DENY_OOM
            }
            _ => CommandFlags::empty(),
        }
    }
}

/// The status byte of a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Err = 1,
    /// A server-initiated delivery (queue message, notification, channel message).
    Event = 2,
}

/// The finer-grained reason carried in the first byte of an `ERR` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ErrorTag {
    NotFound = 1,
    AlreadyExists = 2,
    NotAuthorized = 3,
    NotAuthenticated = 4,
    QueueFull = 5,
    MessageTooLarge = 6,
    Empty = 7,
    NotDeclared = 8,
    OutOfMemory = 9,
    InvalidArgument = 10,
    Persistence = 11,
    Internal = 12,
}
