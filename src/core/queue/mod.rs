// src/core/queue/mod.rs

//! A point-to-point queue: the pending FIFO, the confirm list of delivered but
//! unacknowledged messages, the expiry index, and the sessions attached to it.

pub mod message;

pub use message::Message;

use crate::core::BrokerError;
use crate::core::registry::{EntityId, Named};
use crate::core::session::SessionId;
use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueFlags: u32 {
        const AUTO_DELETE = 1;
        const FORCE_PUSH  = 2;
        const ROUND_ROBIN = 4;
    }
}

/// How a subscriber wants to hear about new messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionMode {
    /// The payload is delivered to the subscriber instead of being stored.
    Message = 1,
    /// Only a "new message" signal is sent; the subscriber follows up with `get`.
    Notify = 2,
}

impl SubscriptionMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Message),
            2 => Some(Self::Notify),
            _ => None,
        }
    }
}

/// A delivered message waiting for its holder to confirm it.
#[derive(Debug, Clone, PartialEq)]
pub struct Unconfirmed {
    pub message: Message,
    pub holder: SessionId,
    pub deadline: Instant,
}

/// What an expiry sweep did to a queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub expired: usize,
    pub requeued: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct Queue {
    pub name: String,
    /// Maximum number of pending messages; 0 means unbounded.
    pub max_msg: u32,
    /// Maximum payload size in bytes; 0 means unbounded.
    pub max_msg_size: u32,
    pub flags: QueueFlags,

    fifo: VecDeque<Message>,
    unconfirmed: IndexMap<u64, Unconfirmed>,
    expiring: BTreeSet<(Instant, u64)>,
    payload_bytes: usize,

    pub declared: IndexSet<SessionId>,
    pub subscribers: IndexMap<SessionId, SubscriptionMode>,
    pub routes: IndexSet<EntityId>,

    declared_cursor: usize,
    subscriber_cursor: usize,
}

impl Named for Queue {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Queue {
    pub fn new(name: String, max_msg: u32, max_msg_size: u32, flags: QueueFlags) -> Self {
        Self {
            name,
            max_msg,
            max_msg_size,
            flags,
            fifo: VecDeque::new(),
            unconfirmed: IndexMap::new(),
            expiring: BTreeSet::new(),
            payload_bytes: 0,
            declared: IndexSet::new(),
            subscribers: IndexMap::new(),
            routes: IndexSet::new(),
            declared_cursor: 0,
            subscriber_cursor: 0,
        }
    }

    /// Number of pending messages in the FIFO.
    pub fn size(&self) -> usize {
        self.fifo.len()
    }

    pub fn unconfirmed_len(&self) -> usize {
        self.unconfirmed.len()
    }

    /// Bytes attributed to this queue by the admission controller.
    pub fn memory_usage(&self) -> usize {
        self.payload_bytes
            + (self.fifo.len() + self.unconfirmed.len()) * message::MESSAGE_OVERHEAD
    }

    pub fn pending(&self) -> impl Iterator<Item = &Message> {
        self.fifo.iter()
    }

    pub fn unconfirmed(&self) -> impl Iterator<Item = &Unconfirmed> {
        self.unconfirmed.values()
    }

    pub fn is_held(&self, tag: u64) -> bool {
        self.unconfirmed.contains_key(&tag)
    }

    pub fn check_size(&self, payload_len: usize) -> Result<(), BrokerError> {
        if self.max_msg_size != 0 && payload_len > self.max_msg_size as usize {
            return Err(BrokerError::MessageTooLarge);
        }
        Ok(())
    }

    /// Appends a message to the FIFO tail.
    ///
    /// A full queue rejects the message with `QueueFull` unless `FORCE_PUSH` is set, in
    /// which case the oldest pending message is evicted and returned.
    pub fn push(&mut self, message: Message) -> Result<Option<Message>, BrokerError> {
        self.check_size(message.payload.len())?;
        let mut evicted = None;
        if self.max_msg != 0 && self.fifo.len() >= self.max_msg as usize {
            if !self.flags.contains(QueueFlags::FORCE_PUSH) {
                return Err(BrokerError::QueueFull);
            }
            evicted = self.pop_head();
        }
        self.link_back(message);
        Ok(evicted)
    }

    /// Appends without the capacity check. Used when restoring a snapshot.
    pub fn restore(&mut self, message: Message) {
        self.link_back(message);
    }

    /// Removes and returns the FIFO head, discarding messages whose deadline has passed.
    pub fn take(&mut self, now: Instant) -> Option<Message> {
        while let Some(message) = self.pop_head() {
            if !message.is_expired(now) {
                return Some(message);
            }
            crate::core::metrics::MESSAGES_EXPIRED.inc();
        }
        None
    }

    /// Records `message` as delivered to `holder` and awaiting confirmation.
    pub fn hold(&mut self, message: Message, holder: SessionId, timeout: Duration, now: Instant) {
        self.payload_bytes += message.payload.len();
        self.unconfirmed.insert(
            message.seq,
            Unconfirmed {
                message,
                holder,
                deadline: now + timeout,
            },
        );
    }

    /// Releases a held message. A tag held by another session is reported as missing.
    pub fn confirm(&mut self, tag: u64, holder: SessionId) -> Result<Message, BrokerError> {
        match self.unconfirmed.get(&tag) {
            Some(entry) if entry.holder == holder => {}
            _ => return Err(BrokerError::NotFound("Message")),
        }
        let entry = self
            .unconfirmed
            .shift_remove(&tag)
            .ok_or(BrokerError::NotFound("Message"))?;
        self.payload_bytes -= entry.message.payload.len();
        Ok(entry.message)
    }

    /// Returns every message held by `holder` to the FIFO head, in their original order.
    /// The retry marker is left untouched.
    pub fn release_holder(&mut self, holder: SessionId) -> usize {
        let tags: Vec<u64> = self
            .unconfirmed
            .iter()
            .filter(|(_, e)| e.holder == holder)
            .map(|(tag, _)| *tag)
            .collect();
        let mut released = Vec::with_capacity(tags.len());
        for tag in tags {
            if let Some(entry) = self.unconfirmed.shift_remove(&tag) {
                self.payload_bytes -= entry.message.payload.len();
                released.push(entry.message);
            }
        }
        let count = released.len();
        for message in released.into_iter().rev() {
            self.link_front(message);
        }
        count
    }

    /// Drops expired pending messages and handles timed-out confirmations: a message is
    /// requeued at the head once, and dropped if it times out again.
    pub fn sweep(&mut self, now: Instant) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        let due: HashSet<u64> = self
            .expiring
            .iter()
            .take_while(|(at, _)| *at <= now)
            .map(|(_, seq)| *seq)
            .collect();
        if !due.is_empty() {
            self.expiring.retain(|(_, seq)| !due.contains(seq));
            let mut freed = 0;
            self.fifo.retain(|m| {
                if due.contains(&m.seq) {
                    freed += m.payload.len();
                    false
                } else {
                    true
                }
            });
            self.payload_bytes -= freed;
            outcome.expired = due.len();
        }

        let timed_out: Vec<u64> = self
            .unconfirmed
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(tag, _)| *tag)
            .collect();
        let mut requeue = Vec::new();
        for tag in timed_out {
            let Some(entry) = self.unconfirmed.shift_remove(&tag) else {
                continue;
            };
            self.payload_bytes -= entry.message.payload.len();
            if entry.message.retried {
                outcome.dropped += 1;
            } else {
                let mut message = entry.message;
                message.retried = true;
                requeue.push(message);
            }
        }
        outcome.requeued = requeue.len();
        for message in requeue.into_iter().rev() {
            self.link_front(message);
        }
        outcome
    }

    /// Removes every pending and unconfirmed message.
    pub fn purge(&mut self) -> usize {
        let removed = self.fifo.len() + self.unconfirmed.len();
        self.fifo.clear();
        self.unconfirmed.clear();
        self.expiring.clear();
        self.payload_bytes = 0;
        removed
    }

    /// Picks the next declared session in rotation.
    pub fn next_declared(&mut self) -> Option<SessionId> {
        if self.declared.is_empty() {
            return None;
        }
        let idx = self.declared_cursor % self.declared.len();
        self.declared_cursor = idx + 1;
        self.declared.get_index(idx).copied()
    }

    /// The sessions that receive a pushed message directly: every message-mode
    /// subscriber, or the next one in rotation for a round-robin queue.
    pub fn message_targets(&mut self) -> Vec<SessionId> {
        let targets: Vec<SessionId> = self
            .subscribers
            .iter()
            .filter(|(_, mode)| **mode == SubscriptionMode::Message)
            .map(|(id, _)| *id)
            .collect();
        if targets.is_empty() || !self.flags.contains(QueueFlags::ROUND_ROBIN) {
            return targets;
        }
        let idx = self.subscriber_cursor % targets.len();
        self.subscriber_cursor = idx + 1;
        vec![targets[idx]]
    }

    pub fn notify_targets(&self) -> Vec<SessionId> {
        self.subscribers
            .iter()
            .filter(|(_, mode)| **mode == SubscriptionMode::Notify)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Detaches a session from the declared and subscriber sets.
    pub fn detach_session(&mut self, session: SessionId) -> bool {
        let declared = self.declared.shift_remove(&session);
        let subscribed = self.subscribers.shift_remove(&session).is_some();
        declared || subscribed
    }

    fn pop_head(&mut self) -> Option<Message> {
        let message = self.fifo.pop_front()?;
        self.unlink(&message);
        Some(message)
    }

    fn link_back(&mut self, message: Message) {
        self.link(&message);
        self.fifo.push_back(message);
    }

    fn link_front(&mut self, message: Message) {
        self.link(&message);
        self.fifo.push_front(message);
    }

    fn link(&mut self, message: &Message) {
        self.payload_bytes += message.payload.len();
        if let Some(at) = message.expires_at {
            self.expiring.insert((at, message.seq));
        }
    }

    fn unlink(&mut self, message: &Message) {
        self.payload_bytes -= message.payload.len();
        if let Some(at) = message.expires_at {
            self.expiring.remove(&(at, message.seq));
        }
    }
}
