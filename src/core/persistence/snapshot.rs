// src/core/persistence/snapshot.rs

//! The Harrier snapshot file format.
//!
//! Layout: magic `HARRIER` and a 4-byte version, a few AUX fields, one record per
//! entity tagged by opcode, an EOF opcode, and a trailing CRC-64 (little endian) over
//! everything before it. Lengths use the compact 6/14/32/64-bit encoding.

use crate::core::BrokerError;
use crate::core::acl::{Permissions, User};
use crate::core::broker::Broker;
use crate::core::channel::{Channel, ChannelFlags};
use crate::core::queue::{Message, Queue, QueueFlags};
use crate::core::route::{Route, RouteFlags};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{CRC_64_REDIS, Crc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, warn};

const SNAPSHOT_MAGIC: &[u8] = b"HARRIER";
const SNAPSHOT_VERSION: &[u8] = b"0001";

const OPCODE_USER: u8 = 0xF1;
const OPCODE_QUEUE: u8 = 0xF2;
const OPCODE_ROUTE: u8 = 0xF3;
const OPCODE_CHANNEL: u8 = 0xF4;
const OPCODE_AUX: u8 = 0xFA;
const OPCODE_EOF: u8 = 0xFF;

const CHECKSUM_ALGO: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub name: String,
    pub password_hash: String,
    pub permissions: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub payload: Bytes,
    pub retried: bool,
    /// Absolute expiry in unix milliseconds; 0 for none.
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueRecord {
    pub name: String,
    pub max_msg: u32,
    pub max_msg_size: u32,
    pub flags: u32,
    pub pending: Vec<MessageRecord>,
    pub unconfirmed: Vec<MessageRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    pub name: String,
    pub flags: u32,
    /// Routing key and the names of the queues bound under it.
    pub bindings: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub name: String,
    pub flags: u32,
}

/// An immutable copy of the durable broker state. Sessions, subscriptions and
/// declarations are runtime-only and never captured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Unix seconds at capture time.
    pub created_at: u64,
    pub users: Vec<UserRecord>,
    pub queues: Vec<QueueRecord>,
    pub routes: Vec<RouteRecord>,
    pub channels: Vec<ChannelRecord>,
}

impl Snapshot {
    /// Copies the durable state out of `broker`. `now` anchors the conversion of message
    /// deadlines to wall-clock time.
    pub fn capture(broker: &Broker, now: Instant) -> Self {
        let now_ms = unix_now_ms();
        let to_record = |message: &Message| MessageRecord {
            payload: message.payload.clone(),
            retried: message.retried,
            expires_at_ms: message
                .expires_at
                .map(|at| now_ms + at.saturating_duration_since(now).as_millis() as u64)
                .unwrap_or(0),
        };

        let users = broker
            .users
            .iter()
            .map(|(_, user)| UserRecord {
                name: user.name.clone(),
                password_hash: user.password_hash.clone(),
                permissions: user.permissions.bits(),
            })
            .collect();

        let queues = broker
            .queues
            .iter()
            .map(|(_, queue)| QueueRecord {
                name: queue.name.clone(),
                max_msg: queue.max_msg,
                max_msg_size: queue.max_msg_size,
                flags: queue.flags.bits(),
                pending: queue.pending().map(to_record).collect(),
                unconfirmed: queue
                    .unconfirmed()
                    .map(|entry| to_record(&entry.message))
                    .collect(),
            })
            .collect();

        let routes = broker
            .routes
            .iter()
            .map(|(_, route)| RouteRecord {
                name: route.name.clone(),
                flags: route.flags.bits(),
                bindings: route
                    .keys()
                    .map(|(key, queues)| {
                        let names = queues
                            .iter()
                            .filter_map(|id| broker.queues.get(*id))
                            .map(|q| q.name.clone())
                            .collect();
                        (key.to_string(), names)
                    })
                    .collect(),
            })
            .collect();

        let channels = broker
            .channels
            .iter()
            .map(|(_, channel)| ChannelRecord {
                name: channel.name.clone(),
                flags: channel.flags.bits(),
            })
            .collect();

        Snapshot {
            created_at: now_ms / 1000,
            users,
            queues,
            routes,
            channels,
        }
    }

    /// Serializes the snapshot into its on-disk form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(SNAPSHOT_MAGIC);
        buf.put_slice(SNAPSHOT_VERSION);

        buf.put_u8(OPCODE_AUX);
        write_string(&mut buf, b"harrier-ver");
        write_string(&mut buf, env!("CARGO_PKG_VERSION").as_bytes());

        buf.put_u8(OPCODE_AUX);
        write_string(&mut buf, b"ctime");
        write_string(&mut buf, self.created_at.to_string().as_bytes());

        for user in &self.users {
            buf.put_u8(OPCODE_USER);
            write_string(&mut buf, user.name.as_bytes());
            write_string(&mut buf, user.password_hash.as_bytes());
            buf.put_u64(user.permissions);
        }

        for queue in &self.queues {
            buf.put_u8(OPCODE_QUEUE);
            write_string(&mut buf, queue.name.as_bytes());
            buf.put_u32(queue.max_msg);
            buf.put_u32(queue.max_msg_size);
            buf.put_u32(queue.flags);
            write_messages(&mut buf, &queue.pending);
            write_messages(&mut buf, &queue.unconfirmed);
        }

        for route in &self.routes {
            buf.put_u8(OPCODE_ROUTE);
            write_string(&mut buf, route.name.as_bytes());
            buf.put_u32(route.flags);
            write_length_encoding(&mut buf, route.bindings.len() as u64);
            for (key, queues) in &route.bindings {
                write_string(&mut buf, key.as_bytes());
                write_length_encoding(&mut buf, queues.len() as u64);
                for queue in queues {
                    write_string(&mut buf, queue.as_bytes());
                }
            }
        }

        for channel in &self.channels {
            buf.put_u8(OPCODE_CHANNEL);
            write_string(&mut buf, channel.name.as_bytes());
            buf.put_u32(channel.flags);
        }

        buf.put_u8(OPCODE_EOF);
        let checksum = CHECKSUM_ALGO.checksum(&buf);
        buf.put_u64_le(checksum);
        buf.freeze()
    }

    /// Parses a snapshot file, verifying the checksum and the header.
    pub fn decode(data: &[u8]) -> Result<Self, BrokerError> {
        if data.len() < SNAPSHOT_MAGIC.len() + SNAPSHOT_VERSION.len() + 1 + 8 {
            return Err(corrupt("file is too short"));
        }
        let (body, checksum_part) = data.split_at(data.len() - 8);
        let expected = CHECKSUM_ALGO.checksum(body);
        let stored = (&checksum_part[..]).get_u64_le();
        if expected != stored {
            return Err(corrupt("checksum mismatch"));
        }

        let mut cursor = Bytes::copy_from_slice(body);
        let magic = cursor.split_to(SNAPSHOT_MAGIC.len());
        if magic != SNAPSHOT_MAGIC {
            return Err(corrupt("invalid magic string"));
        }
        let version = cursor.split_to(SNAPSHOT_VERSION.len());
        if version != SNAPSHOT_VERSION {
            return Err(corrupt("unsupported version"));
        }

        let mut snapshot = Snapshot::default();
        loop {
            if !cursor.has_remaining() {
                return Err(corrupt("missing EOF marker"));
            }
            match cursor.get_u8() {
                OPCODE_AUX => {
                    let key = read_utf8(&mut cursor)?;
                    let value = read_utf8(&mut cursor)?;
                    debug!("Snapshot aux field: {key}={value}");
                    if key == "ctime" {
                        snapshot.created_at = value.parse().unwrap_or(0);
                    }
                }
                OPCODE_USER => {
                    let name = read_utf8(&mut cursor)?;
                    let password_hash = read_utf8(&mut cursor)?;
                    let permissions = read_u64(&mut cursor)?;
                    snapshot.users.push(UserRecord {
                        name,
                        password_hash,
                        permissions,
                    });
                }
                OPCODE_QUEUE => {
                    let name = read_utf8(&mut cursor)?;
                    let max_msg = read_u32(&mut cursor)?;
                    let max_msg_size = read_u32(&mut cursor)?;
                    let flags = read_u32(&mut cursor)?;
                    let pending = read_messages(&mut cursor)?;
                    let unconfirmed = read_messages(&mut cursor)?;
                    snapshot.queues.push(QueueRecord {
                        name,
                        max_msg,
                        max_msg_size,
                        flags,
                        pending,
                        unconfirmed,
                    });
                }
                OPCODE_ROUTE => {
                    let name = read_utf8(&mut cursor)?;
                    let flags = read_u32(&mut cursor)?;
                    let key_count = read_length_encoding(&mut cursor)?;
                    let mut bindings = Vec::new();
                    for _ in 0..key_count {
                        let key = read_utf8(&mut cursor)?;
                        let queue_count = read_length_encoding(&mut cursor)?;
                        let mut queues = Vec::new();
                        for _ in 0..queue_count {
                            queues.push(read_utf8(&mut cursor)?);
                        }
                        bindings.push((key, queues));
                    }
                    snapshot.routes.push(RouteRecord {
                        name,
                        flags,
                        bindings,
                    });
                }
                OPCODE_CHANNEL => {
                    let name = read_utf8(&mut cursor)?;
                    let flags = read_u32(&mut cursor)?;
                    snapshot.channels.push(ChannelRecord { name, flags });
                }
                OPCODE_EOF => break,
                other => {
                    return Err(corrupt(&format!("unknown opcode 0x{other:02X}")));
                }
            }
        }
        if cursor.has_remaining() {
            return Err(corrupt("trailing bytes after EOF marker"));
        }
        Ok(snapshot)
    }

    /// Replaces the durable state of `broker` with the snapshot contents.
    ///
    /// Held messages return to the FIFO head ahead of pending ones; messages whose
    /// expiry has passed are skipped. Tags are reassigned from the broker sequence.
    pub fn restore_into(self, broker: &mut Broker, now: Instant) -> Result<(), BrokerError> {
        let now_ms = unix_now_ms();
        broker.users.clear();
        broker.queues.clear();
        broker.routes.clear();
        broker.channels.clear();

        for record in self.users {
            let permissions = Permissions::from_bits_truncate(record.permissions);
            broker
                .users
                .insert(User::from_hash(record.name, record.password_hash, permissions))
                .map_err(duplicate)?;
        }

        let mut skipped = 0usize;
        for record in self.queues {
            let flags = QueueFlags::from_bits_truncate(record.flags);
            let mut queue = Queue::new(record.name, record.max_msg, record.max_msg_size, flags);
            for message in record.unconfirmed.into_iter().chain(record.pending) {
                let expires_at = match message.expires_at_ms {
                    0 => None,
                    at if at <= now_ms => {
                        skipped += 1;
                        continue;
                    }
                    at => Some(now + Duration::from_millis(at - now_ms)),
                };
                let mut restored = Message::new(broker.next_seq(), message.payload, expires_at);
                restored.retried = message.retried;
                queue.restore(restored);
            }
            broker.queues.insert(queue).map_err(duplicate)?;
        }
        if skipped > 0 {
            debug!("Skipped {skipped} expired messages while restoring the snapshot.");
        }

        for record in self.routes {
            let flags = RouteFlags::from_bits_truncate(record.flags);
            let mut route = Route::new(record.name, flags);
            let mut bound = Vec::new();
            for (key, queues) in record.bindings {
                for queue_name in queues {
                    let Some(queue_id) = broker.queues.id_of(&queue_name) else {
                        warn!(
                            "Route '{}' references unknown queue '{}'; binding dropped.",
                            route.name, queue_name
                        );
                        continue;
                    };
                    route.bind(&key, queue_id)?;
                    bound.push(queue_id);
                }
            }
            let route_id = broker.routes.insert(route).map_err(duplicate)?;
            for queue_id in bound {
                if let Some(queue) = broker.queues.get_mut(queue_id) {
                    queue.routes.insert(route_id);
                }
            }
        }

        for record in self.channels {
            let flags = ChannelFlags::from_bits_truncate(record.flags);
            broker
                .channels
                .insert(Channel::new(record.name, flags))
                .map_err(duplicate)?;
        }
        Ok(())
    }
}

fn corrupt(reason: &str) -> BrokerError {
    BrokerError::Persistence(format!("corrupt snapshot: {reason}"))
}

fn duplicate(err: BrokerError) -> BrokerError {
    corrupt(&err.to_string())
}

pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// --- Length and string encoding helpers ---

fn write_messages(buf: &mut BytesMut, messages: &[MessageRecord]) {
    write_length_encoding(buf, messages.len() as u64);
    for message in messages {
        buf.put_u8(message.retried as u8);
        buf.put_u64(message.expires_at_ms);
        write_string(buf, &message.payload);
    }
}

fn read_messages(cursor: &mut Bytes) -> Result<Vec<MessageRecord>, BrokerError> {
    let count = read_length_encoding(cursor)?;
    let mut messages = Vec::new();
    for _ in 0..count {
        let retried = read_u8(cursor)? != 0;
        let expires_at_ms = read_u64(cursor)?;
        let payload = read_string(cursor)?;
        messages.push(MessageRecord {
            payload,
            retried,
            expires_at_ms,
        });
    }
    Ok(messages)
}

fn write_string(buf: &mut BytesMut, s: &[u8]) {
    write_length_encoding(buf, s.len() as u64);
    buf.put_slice(s);
}

fn read_string(cursor: &mut Bytes) -> Result<Bytes, BrokerError> {
    let len = read_length_encoding(cursor)? as usize;
    if cursor.remaining() < len {
        return Err(corrupt("not enough data for string"));
    }
    Ok(cursor.split_to(len))
}

fn read_utf8(cursor: &mut Bytes) -> Result<String, BrokerError> {
    let raw = read_string(cursor)?;
    String::from_utf8(raw.to_vec()).map_err(|_| corrupt("invalid UTF-8 string"))
}

fn read_u8(cursor: &mut Bytes) -> Result<u8, BrokerError> {
    if cursor.remaining() < 1 {
        return Err(corrupt("unexpected end of data"));
    }
    Ok(cursor.get_u8())
}

fn read_u32(cursor: &mut Bytes) -> Result<u32, BrokerError> {
    if cursor.remaining() < 4 {
        return Err(corrupt("unexpected end of data"));
    }
    Ok(cursor.get_u32())
}

fn read_u64(cursor: &mut Bytes) -> Result<u64, BrokerError> {
    if cursor.remaining() < 8 {
        return Err(corrupt("unexpected end of data"));
    }
    Ok(cursor.get_u64())
}

fn write_length_encoding(buf: &mut BytesMut, len: u64) {
    if len < (1 << 6) {
        buf.put_u8(len as u8);
    } else if len < (1 << 14) {
        buf.put_u16((len | (1 << 14)) as u16);
    } else if len < (1 << 32) {
        buf.put_u8(0x80);
        buf.put_u32(len as u32);
    } else {
        buf.put_u8(0x81);
        buf.put_u64(len);
    }
}

fn read_length_encoding(cursor: &mut Bytes) -> Result<u64, BrokerError> {
    let first = read_u8(cursor)?;
    match (first & 0xC0) >> 6 {
        0b00 => Ok(u64::from(first & 0x3F)),
        0b01 => {
            let next = read_u8(cursor)?;
            Ok(u64::from(((first as u16 & 0x3F) << 8) | next as u16))
        }
        0b10 => match first & 0x3F {
            0 => read_u32(cursor).map(u64::from),
            1 => read_u64(cursor),
            _ => Err(corrupt("unknown length encoding")),
        },
        _ => Err(corrupt("unknown length encoding")),
    }
}
