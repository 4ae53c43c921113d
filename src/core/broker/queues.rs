// src/core/broker/queues.rs

//! Queue operations: registry management and push/get/pop/confirm delivery.

use super::{Broker, events, validate_name};
use crate::core::BrokerError;
use crate::core::metrics;
use crate::core::queue::{Message, Queue, QueueFlags, SubscriptionMode};
use crate::core::registry::EntityId;
use crate::core::session::SessionId;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// A row of `queue_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSummary {
    pub name: String,
    pub max_msg: u32,
    pub max_msg_size: u32,
    pub flags: u32,
    pub size: u32,
    pub declared: u32,
    pub subscribers: u32,
}

/// A message handed to the caller of `get` or `pop`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub tag: u64,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Consume {
    /// Held on the confirm list unless the receiver is noack.
    Get,
    /// Always finalized on delivery.
    Pop,
}

impl Broker {
    pub fn queue_create(
        &mut self,
        name: &str,
        max_msg: u32,
        max_msg_size: u32,
        flags: u32,
    ) -> Result<EntityId, BrokerError> {
        validate_name("Queue", name)?;
        let flags = QueueFlags::from_bits(flags)
            .ok_or_else(|| BrokerError::InvalidArgument(format!("unknown queue flags 0x{flags:x}")))?;
        let id = self
            .queues
            .insert(Queue::new(name.to_owned(), max_msg, max_msg_size, flags))?;
        info!("Queue '{}' created (flags {:?}).", name, flags);
        self.mark_dirty();
        Ok(id)
    }

    /// Registers the session's interest in a queue, which `get` and `pop` require.
    pub fn queue_declare(&mut self, session: SessionId, name: &str) -> Result<(), BrokerError> {
        let id = self.queues.lookup(name)?;
        self.session_mut_or_err(session)?.declared.insert(id);
        if let Some(queue) = self.queues.get_mut(id) {
            queue.declared.insert(session);
        }
        Ok(())
    }

    pub fn queue_exist(&self, name: &str) -> bool {
        self.queues.contains(name)
    }

    pub fn queue_list(&self) -> Vec<QueueSummary> {
        self.queues
            .iter()
            .map(|(_, q)| QueueSummary {
                name: q.name.clone(),
                max_msg: q.max_msg,
                max_msg_size: q.max_msg_size,
                flags: q.flags.bits(),
                size: q.size() as u32,
                declared: q.declared.len() as u32,
                subscribers: q.subscribers.len() as u32,
            })
            .collect()
    }

    pub fn queue_rename(&mut self, from: &str, to: &str) -> Result<(), BrokerError> {
        validate_name("Queue", to)?;
        self.queues.rename(from, to)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn queue_size(&self, name: &str) -> Result<usize, BrokerError> {
        self.queues
            .by_name(name)
            .map(Queue::size)
            .ok_or(BrokerError::NotFound("Queue"))
    }

    /// Pushes a message. `expire_ms` of 0 means the message never expires.
    pub fn queue_push(
        &mut self,
        name: &str,
        expire_ms: u32,
        payload: Bytes,
        now: Instant,
    ) -> Result<(), BrokerError> {
        let id = self.queues.lookup(name)?;
        self.push_to_queue(id, expire_ms, payload, now)
    }

    /// The shared push path of `queue_push` and `route_push`.
    pub(crate) fn push_to_queue(
        &mut self,
        id: EntityId,
        expire_ms: u32,
        payload: Bytes,
        now: Instant,
    ) -> Result<(), BrokerError> {
        if payload.len() > self.settings.max_message_size {
            return Err(BrokerError::MessageTooLarge);
        }
        let seq = self.next_seq();
        let queue = self
            .queues
            .get_mut(id)
            .ok_or(BrokerError::NotFound("Queue"))?;
        queue.check_size(payload.len())?;

        let targets = queue.message_targets();
        if !targets.is_empty() {
            // Message-mode subscribers take the payload directly; nothing is stored.
            let queue_name = queue.name.clone();
            for target in targets {
                if self.send_to(target, events::queue_message(&queue_name, seq, &payload)) {
                    metrics::MESSAGES_DELIVERED.inc();
                }
            }
            metrics::MESSAGES_PUSHED.inc();
            return Ok(());
        }

        let expires_at = (expire_ms > 0).then(|| now + Duration::from_millis(expire_ms as u64));
        if let Some(evicted) = queue.push(Message::new(seq, payload, expires_at))? {
            debug!("Queue '{}' full, evicted message {}.", queue.name, evicted.seq);
            metrics::MESSAGES_EVICTED.inc();
        }
        metrics::MESSAGES_PUSHED.inc();

        let notify = queue.notify_targets();
        if !notify.is_empty() {
            let queue_name = queue.name.clone();
            for target in notify {
                self.send_to(target, events::queue_notify(&queue_name));
            }
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn queue_get(
        &mut self,
        session: SessionId,
        name: &str,
        now: Instant,
    ) -> Result<Delivered, BrokerError> {
        self.consume(session, name, Consume::Get, now)
    }

    pub fn queue_pop(
        &mut self,
        session: SessionId,
        name: &str,
        now: Instant,
    ) -> Result<Delivered, BrokerError> {
        self.consume(session, name, Consume::Pop, now)
    }

    fn consume(
        &mut self,
        session: SessionId,
        name: &str,
        mode: Consume,
        now: Instant,
    ) -> Result<Delivered, BrokerError> {
        let id = self.queues.lookup(name)?;
        let confirm_timeout = self.settings.confirm_timeout;
        let queue = self
            .queues
            .get_mut(id)
            .ok_or(BrokerError::NotFound("Queue"))?;
        if !queue.declared.contains(&session) {
            return Err(BrokerError::NotDeclared);
        }
        let pending = queue.size();
        let Some(message) = queue.take(now) else {
            if pending > 0 {
                // Everything left had expired and was discarded.
                self.persistence.mark_dirty();
            }
            return Err(BrokerError::Empty);
        };

        let target = if queue.flags.contains(QueueFlags::ROUND_ROBIN) && queue.declared.len() > 1 {
            queue.next_declared().unwrap_or(session)
        } else {
            session
        };
        let noack = self.sessions.get(&target).is_none_or(|s| s.noack);
        if mode == Consume::Get && !noack {
            queue.hold(message.clone(), target, confirm_timeout, now);
        }
        metrics::MESSAGES_DELIVERED.inc();
        self.persistence.mark_dirty();

        if target == session {
            return Ok(Delivered {
                tag: message.seq,
                payload: message.payload,
            });
        }
        let queue_name = queue.name.clone();
        debug!(
            "Round-robin delivery of message {} from '{}' to session {}.",
            message.seq, queue_name, target
        );
        self.send_to(target, events::queue_message(&queue_name, message.seq, &message.payload));
        Err(BrokerError::Empty)
    }

    pub fn queue_confirm(
        &mut self,
        session: SessionId,
        name: &str,
        tag: u64,
    ) -> Result<(), BrokerError> {
        let queue = self
            .queues
            .by_name_mut(name)
            .ok_or(BrokerError::NotFound("Queue"))?;
        queue.confirm(tag, session)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn queue_subscribe(
        &mut self,
        session: SessionId,
        name: &str,
        mode: u8,
    ) -> Result<(), BrokerError> {
        let mode = SubscriptionMode::from_u8(mode).ok_or_else(|| {
            BrokerError::InvalidArgument(format!("unknown subscription mode {mode}"))
        })?;
        let id = self.queues.lookup(name)?;
        self.session_mut_or_err(session)?.subscribed.insert(id);
        if let Some(queue) = self.queues.get_mut(id) {
            queue.subscribers.insert(session, mode);
        }
        Ok(())
    }

    pub fn queue_unsubscribe(&mut self, session: SessionId, name: &str) -> Result<(), BrokerError> {
        let id = self.queues.lookup(name)?;
        let queue = self
            .queues
            .get_mut(id)
            .ok_or(BrokerError::NotFound("Queue"))?;
        if queue.subscribers.shift_remove(&session).is_none() {
            return Err(BrokerError::NotFound("Subscription"));
        }
        if let Some(s) = self.sessions.get_mut(&session) {
            s.subscribed.shift_remove(&id);
        }
        Ok(())
    }

    pub fn queue_purge(&mut self, name: &str) -> Result<usize, BrokerError> {
        let queue = self
            .queues
            .by_name_mut(name)
            .ok_or(BrokerError::NotFound("Queue"))?;
        let removed = queue.purge();
        self.mark_dirty();
        Ok(removed)
    }

    pub fn queue_delete(&mut self, name: &str) -> Result<(), BrokerError> {
        let id = self.queues.lookup(name)?;
        self.remove_queue(id);
        self.mark_dirty();
        Ok(())
    }

    /// Deletes a queue after detaching every session and route that references it.
    /// Routes left without bindings are removed if they are auto-delete.
    pub(crate) fn remove_queue(&mut self, id: EntityId) {
        let Some(queue) = self.queues.remove(id) else {
            return;
        };
        for session in queue.declared.iter().chain(queue.subscribers.keys()) {
            if let Some(s) = self.sessions.get_mut(session) {
                s.declared.shift_remove(&id);
                s.subscribed.shift_remove(&id);
            }
        }
        for route_id in &queue.routes {
            self.detach_queue_from_route(*route_id, id);
        }
        info!("Queue '{}' deleted.", queue.name);
    }
}
