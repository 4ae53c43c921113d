// src/core/channel/mod.rs

//! Publish/subscribe channels with exact topic and glob pattern subscriptions.

pub mod pattern;

pub use pattern::TopicPattern;

use crate::core::registry::Named;
use crate::core::session::SessionId;
use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelFlags: u32 {
        const AUTO_DELETE = 1;
        const ROUND_ROBIN = 4;
    }
}

/// One delivery produced by a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub session: SessionId,
    /// The pattern that matched, or `None` for an exact topic subscription.
    pub pattern: Option<String>,
}

#[derive(Debug)]
struct PatternEntry {
    pattern: TopicPattern,
    sessions: IndexSet<SessionId>,
}

#[derive(Debug)]
pub struct Channel {
    pub name: String,
    pub flags: ChannelFlags,
    topics: IndexMap<String, IndexSet<SessionId>>,
    patterns: IndexMap<String, PatternEntry>,
    cursor: usize,
}

impl Named for Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Channel {
    pub fn new(name: String, flags: ChannelFlags) -> Self {
        Self {
            name,
            flags,
            topics: IndexMap::new(),
            patterns: IndexMap::new(),
            cursor: 0,
        }
    }

    /// Returns false if the session was already subscribed to `topic`.
    pub fn subscribe(&mut self, topic: &str, session: SessionId) -> bool {
        self.topics.entry(topic.to_owned()).or_default().insert(session)
    }

    pub fn psubscribe(&mut self, pattern: &str, session: SessionId) -> bool {
        self.patterns
            .entry(pattern.to_owned())
            .or_insert_with(|| PatternEntry {
                pattern: TopicPattern::compile(pattern),
                sessions: IndexSet::new(),
            })
            .sessions
            .insert(session)
    }

    pub fn unsubscribe(&mut self, topic: &str, session: SessionId) -> bool {
        let Some(sessions) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = sessions.shift_remove(&session);
        if sessions.is_empty() {
            self.topics.shift_remove(topic);
        }
        removed
    }

    pub fn punsubscribe(&mut self, pattern: &str, session: SessionId) -> bool {
        let Some(entry) = self.patterns.get_mut(pattern) else {
            return false;
        };
        let removed = entry.sessions.shift_remove(&session);
        if entry.sessions.is_empty() {
            self.patterns.shift_remove(pattern);
        }
        removed
    }

    /// Removes every topic and pattern subscription held by `session`.
    pub fn remove_session(&mut self, session: SessionId) -> bool {
        let mut removed = false;
        self.topics.retain(|_, sessions| {
            removed |= sessions.shift_remove(&session);
            !sessions.is_empty()
        });
        self.patterns.retain(|_, entry| {
            removed |= entry.sessions.shift_remove(&session);
            !entry.sessions.is_empty()
        });
        removed
    }

    /// Whether `session` still holds any subscription on this channel.
    pub fn has_session(&self, session: SessionId) -> bool {
        self.topics.values().any(|s| s.contains(&session))
            || self.patterns.values().any(|e| e.sessions.contains(&session))
    }

    /// Resolves the receivers of a publish to `topic`.
    ///
    /// Exact subscribers come first, then pattern subscribers in subscription order.
    /// A round-robin channel picks a single delivery from that list per publish.
    pub fn deliveries(&mut self, topic: &str) -> Vec<Delivery> {
        let mut out: Vec<Delivery> = self
            .topics
            .get(topic)
            .into_iter()
            .flat_map(|sessions| sessions.iter())
            .map(|session| Delivery {
                session: *session,
                pattern: None,
            })
            .collect();
        for (raw, entry) in &self.patterns {
            if entry.pattern.matches(topic) {
                out.extend(entry.sessions.iter().map(|session| Delivery {
                    session: *session,
                    pattern: Some(raw.clone()),
                }));
            }
        }
        if out.is_empty() || !self.flags.contains(ChannelFlags::ROUND_ROBIN) {
            return out;
        }
        let idx = self.cursor % out.len();
        self.cursor = idx + 1;
        vec![out.swap_remove(idx)]
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.patterns.is_empty()
    }
}
