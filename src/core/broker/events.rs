// src/core/broker/events.rs

//! Builders for server-initiated `EVENT` frames.

use crate::core::protocol::{BodyWriter, CommandId, Response};

pub const QUEUE_EVENT_MESSAGE: u8 = 1;
pub const QUEUE_EVENT_NOTIFY: u8 = 2;

/// A queue message delivered to a subscriber or a round-robin target.
pub fn queue_message(queue: &str, tag: u64, payload: &[u8]) -> Response {
    let mut w = BodyWriter::new();
    w.put_u8(QUEUE_EVENT_MESSAGE)
        .put_name(queue)
        .put_u64(tag)
        .put_blob(payload);
    Response::event(CommandId::QueueSubscribe, w.freeze())
}

/// Tells a notify-mode subscriber that `queue` has a new message.
pub fn queue_notify(queue: &str) -> Response {
    let mut w = BodyWriter::new();
    w.put_u8(QUEUE_EVENT_NOTIFY).put_name(queue);
    Response::event(CommandId::QueueSubscribe, w.freeze())
}

pub fn channel_message(channel: &str, topic: &str, payload: &[u8]) -> Response {
    let mut w = BodyWriter::new();
    w.put_name(channel).put_string(topic).put_blob(payload);
    Response::event(CommandId::ChannelSubscribe, w.freeze())
}

pub fn channel_pattern_message(channel: &str, pattern: &str, topic: &str, payload: &[u8]) -> Response {
    let mut w = BodyWriter::new();
    w.put_name(channel)
        .put_string(pattern)
        .put_string(topic)
        .put_blob(payload);
    Response::event(CommandId::ChannelPSubscribe, w.freeze())
}
