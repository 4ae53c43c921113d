// src/core/broker/cleanup.rs

//! Session teardown and the periodic maintenance passes run from the engine's timers.

use super::Broker;
use crate::core::channel::ChannelFlags;
use crate::core::metrics;
use crate::core::queue::{QueueFlags, SweepOutcome};
use crate::core::session::SessionId;
use tokio::time::Instant;
use tracing::{debug, info};

impl Broker {
    /// Removes a session and detaches it from every queue and channel it touched.
    ///
    /// Unconfirmed messages it held go back to the head of their queue. Auto-delete
    /// queues left without declarers and auto-delete channels left without
    /// subscriptions are deleted. Dropping the session closes its outbound channel,
    /// which makes the connection task flush and hang up.
    pub fn remove_session(&mut self, id: SessionId) -> bool {
        let Some(session) = self.sessions.remove(&id) else {
            return false;
        };

        let mut queue_ids: Vec<_> = session.declared.iter().copied().collect();
        for qid in &session.subscribed {
            if !queue_ids.contains(qid) {
                queue_ids.push(*qid);
            }
        }
        let mut released = 0;
        let mut drop_queues = Vec::new();
        for qid in queue_ids {
            let Some(queue) = self.queues.get_mut(qid) else {
                continue;
            };
            let was_declared = queue.declared.contains(&id);
            queue.detach_session(id);
            released += queue.release_holder(id);
            if was_declared
                && queue.flags.contains(QueueFlags::AUTO_DELETE)
                && queue.declared.is_empty()
            {
                drop_queues.push(qid);
            }
        }
        if released > 0 {
            metrics::MESSAGES_REQUEUED.inc_by(released as f64);
            self.mark_dirty();
        }
        for qid in drop_queues {
            self.remove_queue(qid);
            self.mark_dirty();
        }

        for cid in &session.channels {
            let Some(channel) = self.channels.get_mut(*cid) else {
                continue;
            };
            channel.remove_session(id);
            if channel.flags.contains(ChannelFlags::AUTO_DELETE) && channel.is_empty() {
                self.remove_channel(*cid);
                self.mark_dirty();
            }
        }

        metrics::CONNECTED_CLIENTS.set(self.sessions.len() as f64);
        debug!(
            "Session {} ({}) removed after {:?}, {} held messages released.",
            id,
            session.addr,
            session.connected_at.elapsed(),
            released
        );
        true
    }

    /// Drops expired messages and requeues or drops timed-out confirmations.
    pub fn sweep_expired(&mut self, now: Instant) -> SweepOutcome {
        let mut total = SweepOutcome::default();
        for (_, queue) in self.queues.iter_mut() {
            let outcome = queue.sweep(now);
            total.expired += outcome.expired;
            total.requeued += outcome.requeued;
            total.dropped += outcome.dropped;
        }
        if total != SweepOutcome::default() {
            metrics::MESSAGES_EXPIRED.inc_by((total.expired + total.dropped) as f64);
            metrics::MESSAGES_REQUEUED.inc_by(total.requeued as f64);
            debug!(
                "Expiry sweep: {} expired, {} requeued, {} dropped.",
                total.expired, total.requeued, total.dropped
            );
            self.mark_dirty();
        }
        total
    }

    /// Disconnects sessions idle for longer than `client_timeout`.
    pub fn close_idle_sessions(&mut self, now: Instant) -> Vec<SessionId> {
        let timeout = self.settings.client_timeout;
        let idle: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_idle(now, timeout))
            .map(|s| s.id)
            .collect();
        for id in &idle {
            info!("Closing session {} after {:?} of inactivity.", id, timeout);
            self.remove_session(*id);
        }
        idle
    }
}
