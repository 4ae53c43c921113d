// src/core/acl/permissions.rs

use crate::core::protocol::CommandId;
use bitflags::bitflags;

bitflags! {
    /// The capabilities a user holds. Each non-public command has exactly one bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permissions: u64 {
        const STAT                  = 1 << 0;
        const SAVE                  = 1 << 1;
        const FLUSH                 = 1 << 2;

        const USER_CREATE           = 1 << 8;
        const USER_LIST             = 1 << 9;
        const USER_RENAME           = 1 << 10;
        const USER_SET_PERM         = 1 << 11;
        const USER_DELETE           = 1 << 12;

        const QUEUE_CREATE          = 1 << 16;
        const QUEUE_DECLARE         = 1 << 17;
        const QUEUE_EXIST           = 1 << 18;
        const QUEUE_LIST            = 1 << 19;
        const QUEUE_RENAME          = 1 << 20;
        const QUEUE_SIZE            = 1 << 21;
        const QUEUE_PUSH            = 1 << 22;
        const QUEUE_GET             = 1 << 23;
        const QUEUE_POP             = 1 << 24;
        const QUEUE_CONFIRM         = 1 << 25;
        const QUEUE_SUBSCRIBE       = 1 << 26;
        const QUEUE_UNSUBSCRIBE     = 1 << 27;
        const QUEUE_PURGE           = 1 << 28;
        const QUEUE_DELETE          = 1 << 29;

        const ROUTE_CREATE          = 1 << 32;
        const ROUTE_EXIST           = 1 << 33;
        const ROUTE_LIST            = 1 << 34;
        const ROUTE_KEYS            = 1 << 35;
        const ROUTE_RENAME          = 1 << 36;
        const ROUTE_BIND            = 1 << 37;
        const ROUTE_UNBIND          = 1 << 38;
        const ROUTE_PUSH            = 1 << 39;
        const ROUTE_DELETE          = 1 << 40;

        const CHANNEL_CREATE        = 1 << 48;
        const CHANNEL_EXIST         = 1 << 49;
        const CHANNEL_LIST          = 1 << 50;
        const CHANNEL_RENAME        = 1 << 51;
        const CHANNEL_PUBLISH       = 1 << 52;
        const CHANNEL_SUBSCRIBE     = 1 << 53;
        const CHANNEL_PSUBSCRIBE    = 1 << 54;
        const CHANNEL_UNSUBSCRIBE   = 1 << 55;
        const CHANNEL_PUNSUBSCRIBE  = 1 << 56;
        const CHANNEL_DELETE        = 1 << 57;

        const USER = Self::USER_CREATE.bits()
            | Self::USER_LIST.bits()
            | Self::USER_RENAME.bits()
            | Self::USER_SET_PERM.bits()
            | Self::USER_DELETE.bits();

        const QUEUE = Self::QUEUE_CREATE.bits()
            | Self::QUEUE_DECLARE.bits()
            | Self::QUEUE_EXIST.bits()
            | Self::QUEUE_LIST.bits()
            | Self::QUEUE_RENAME.bits()
            | Self::QUEUE_SIZE.bits()
            | Self::QUEUE_PUSH.bits()
            | Self::QUEUE_GET.bits()
            | Self::QUEUE_POP.bits()
            | Self::QUEUE_CONFIRM.bits()
            | Self::QUEUE_SUBSCRIBE.bits()
            | Self::QUEUE_UNSUBSCRIBE.bits()
            | Self::QUEUE_PURGE.bits()
            | Self::QUEUE_DELETE.bits();

        const ROUTE = Self::ROUTE_CREATE.bits()
            | Self::ROUTE_EXIST.bits()
            | Self::ROUTE_LIST.bits()
            | Self::ROUTE_KEYS.bits()
            | Self::ROUTE_RENAME.bits()
            | Self::ROUTE_BIND.bits()
            | Self::ROUTE_UNBIND.bits()
            | Self::ROUTE_PUSH.bits()
            | Self::ROUTE_DELETE.bits();

        const CHANNEL = Self::CHANNEL_CREATE.bits()
            | Self::CHANNEL_EXIST.bits()
            | Self::CHANNEL_LIST.bits()
            | Self::CHANNEL_RENAME.bits()
            | Self::CHANNEL_PUBLISH.bits()
            | Self::CHANNEL_SUBSCRIBE.bits()
            | Self::CHANNEL_PSUBSCRIBE.bits()
            | Self::CHANNEL_UNSUBSCRIBE.bits()
            | Self::CHANNEL_PUNSUBSCRIBE.bits()
            | Self::CHANNEL_DELETE.bits();
    }
}

impl CommandId {
    /// The permission bit a session's user must hold to run this command.
    /// `None` marks a public command.
    pub fn required_permission(self) -> Option<Permissions> {
        use CommandId::*;
        let perm = match self {
            Auth | Ping | Disconnect => return None,
            Stat => Permissions::STAT,
            Save => Permissions::SAVE,
            Flush => Permissions::FLUSH,

            UserCreate => Permissions::USER_CREATE,
            UserList => Permissions::USER_LIST,
            UserRename => Permissions::USER_RENAME,
            UserSetPerm => Permissions::USER_SET_PERM,
            UserDelete => Permissions::USER_DELETE,

            QueueCreate => Permissions::QUEUE_CREATE,
            QueueDeclare => Permissions::QUEUE_DECLARE,
            QueueExist => Permissions::QUEUE_EXIST,
            QueueList => Permissions::QUEUE_LIST,
            QueueRename => Permissions::QUEUE_RENAME,
            QueueSize => Permissions::QUEUE_SIZE,
            QueuePush => Permissions::QUEUE_PUSH,
            QueueGet => Permissions::QUEUE_GET,
            QueuePop => Permissions::QUEUE_POP,
            QueueConfirm => Permissions::QUEUE_CONFIRM,
            QueueSubscribe => Permissions::QUEUE_SUBSCRIBE,
            QueueUnsubscribe => Permissions::QUEUE_UNSUBSCRIBE,
            QueuePurge => Permissions::QUEUE_PURGE,
            QueueDelete => Permissions::QUEUE_DELETE,

            RouteCreate => Permissions::ROUTE_CREATE,
            RouteExist => Permissions::ROUTE_EXIST,
            RouteList => Permissions::ROUTE_LIST,
            RouteKeys => Permissions::ROUTE_KEYS,
            RouteRename => Permissions::ROUTE_RENAME,
            RouteBind => Permissions::ROUTE_BIND,
            RouteUnbind => Permissions::ROUTE_UNBIND,
            RoutePush => Permissions::ROUTE_PUSH,
            RouteDelete => Permissions::ROUTE_DELETE,

            ChannelCreate => Permissions::CHANNEL_CREATE,
            ChannelExist => Permissions::CHANNEL_EXIST,
            ChannelList => Permissions::CHANNEL_LIST,
            ChannelRename => Permissions::CHANNEL_RENAME,
            ChannelPublish => Permissions::CHANNEL_PUBLISH,
            ChannelSubscribe => Permissions::CHANNEL_SUBSCRIBE,
            ChannelPSubscribe => Permissions::CHANNEL_PSUBSCRIBE,
            ChannelUnsubscribe => Permissions::CHANNEL_UNSUBSCRIBE,
            ChannelPUnsubscribe => Permissions::CHANNEL_PUNSUBSCRIBE,
            ChannelDelete => Permissions::CHANNEL_DELETE,
        };
        Some(perm)
    }
}
