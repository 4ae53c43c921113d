// src/core/broker/channels.rs

use super::{Broker, events, validate_name};
use crate::core::BrokerError;
use crate::core::channel::{Channel, ChannelFlags};
use crate::core::metrics;
use crate::core::registry::EntityId;
use crate::core::session::SessionId;
use bytes::Bytes;
use tracing::info;

/// A row of `channel_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSummary {
    pub name: String,
    pub flags: u32,
    pub topics: u32,
    pub patterns: u32,
}

impl Broker {
    pub fn channel_create(&mut self, name: &str, flags: u32) -> Result<EntityId, BrokerError> {
        validate_name("Channel", name)?;
        let flags = ChannelFlags::from_bits(flags).ok_or_else(|| {
            BrokerError::InvalidArgument(format!("unknown channel flags 0x{flags:x}"))
        })?;
        let id = self.channels.insert(Channel::new(name.to_owned(), flags))?;
        info!("Channel '{}' created (flags {:?}).", name, flags);
        self.mark_dirty();
        Ok(id)
    }

    pub fn channel_exist(&self, name: &str) -> bool {
        self.channels.contains(name)
    }

    pub fn channel_list(&self) -> Vec<ChannelSummary> {
        self.channels
            .iter()
            .map(|(_, c)| ChannelSummary {
                name: c.name.clone(),
                flags: c.flags.bits(),
                topics: c.topic_count() as u32,
                patterns: c.pattern_count() as u32,
            })
            .collect()
    }

    pub fn channel_rename(&mut self, from: &str, to: &str) -> Result<(), BrokerError> {
        validate_name("Channel", to)?;
        self.channels.rename(from, to)?;
        self.mark_dirty();
        Ok(())
    }

    /// Delivers `payload` to the subscribers matching `topic` and returns how many
    /// sessions it reached.
    pub fn channel_publish(
        &mut self,
        name: &str,
        topic: &str,
        payload: Bytes,
    ) -> Result<u32, BrokerError> {
        let channel = self
            .channels
            .by_name_mut(name)
            .ok_or(BrokerError::NotFound("Channel"))?;
        let deliveries = channel.deliveries(topic);
        let channel_name = channel.name.clone();

        let mut receivers = 0;
        for delivery in deliveries {
            let event = match &delivery.pattern {
                Some(pattern) => {
                    events::channel_pattern_message(&channel_name, pattern, topic, &payload)
                }
                None => events::channel_message(&channel_name, topic, &payload),
            };
            if self.send_to(delivery.session, event) {
                receivers += 1;
            }
        }
        metrics::CHANNEL_MESSAGES_PUBLISHED.inc_by(receivers as f64);
        Ok(receivers)
    }

    pub fn channel_subscribe(
        &mut self,
        session: SessionId,
        name: &str,
        topic: &str,
    ) -> Result<(), BrokerError> {
        self.attach_channel(session, name, topic, false)
    }

    pub fn channel_psubscribe(
        &mut self,
        session: SessionId,
        name: &str,
        pattern: &str,
    ) -> Result<(), BrokerError> {
        self.attach_channel(session, name, pattern, true)
    }

    pub fn channel_unsubscribe(
        &mut self,
        session: SessionId,
        name: &str,
        topic: &str,
    ) -> Result<(), BrokerError> {
        self.detach_channel(session, name, topic, false)
    }

    pub fn channel_punsubscribe(
        &mut self,
        session: SessionId,
        name: &str,
        pattern: &str,
    ) -> Result<(), BrokerError> {
        self.detach_channel(session, name, pattern, true)
    }

    pub fn channel_delete(&mut self, name: &str) -> Result<(), BrokerError> {
        let id = self.channels.lookup(name)?;
        self.remove_channel(id);
        self.mark_dirty();
        Ok(())
    }

    fn attach_channel(
        &mut self,
        session: SessionId,
        name: &str,
        subject: &str,
        is_pattern: bool,
    ) -> Result<(), BrokerError> {
        if subject.is_empty() {
            return Err(BrokerError::InvalidArgument("topic must not be empty".into()));
        }
        let id = self.channels.lookup(name)?;
        self.session_mut_or_err(session)?.channels.insert(id);
        if let Some(channel) = self.channels.get_mut(id) {
            if is_pattern {
                channel.psubscribe(subject, session);
            } else {
                channel.subscribe(subject, session);
            }
        }
        Ok(())
    }

    fn detach_channel(
        &mut self,
        session: SessionId,
        name: &str,
        subject: &str,
        is_pattern: bool,
    ) -> Result<(), BrokerError> {
        let id = self.channels.lookup(name)?;
        let channel = self
            .channels
            .get_mut(id)
            .ok_or(BrokerError::NotFound("Channel"))?;
        let removed = if is_pattern {
            channel.punsubscribe(subject, session)
        } else {
            channel.unsubscribe(subject, session)
        };
        if !removed {
            return Err(BrokerError::NotFound("Subscription"));
        }
        let still_subscribed = channel.has_session(session);
        let drop_channel = channel.flags.contains(ChannelFlags::AUTO_DELETE) && channel.is_empty();
        if !still_subscribed && let Some(s) = self.sessions.get_mut(&session) {
            s.channels.shift_remove(&id);
        }
        if drop_channel {
            self.remove_channel(id);
        }
        Ok(())
    }

    /// Deletes a channel and forgets it in every session that subscribed to it.
    pub(crate) fn remove_channel(&mut self, id: EntityId) {
        let Some(channel) = self.channels.remove(id) else {
            return;
        };
        for session in self.sessions.values_mut() {
            session.channels.shift_remove(&id);
        }
        info!("Channel '{}' deleted.", channel.name);
    }
}
