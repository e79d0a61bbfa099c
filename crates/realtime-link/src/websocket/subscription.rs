//! Topic intent bookkeeping with a cancellable unsubscribe grace.
//!
//! The table tracks, per topic, whether a subscribe intent has been sent and
//! whether an unsubscribe is waiting for its grace period. A retract followed
//! by a re-declare within the grace cancels the unsubscribe, so a brief
//! remount never reaches the wire.

use std::{collections::HashMap, time::Duration};

use tokio::runtime::Handle;
use tracing::debug;

use super::types::Topic;
use crate::timer::Deferred;

#[derive(Debug, Default)]
struct TopicEntry {
    /// A subscribe intent has been handed to the link.
    active: bool,
    /// Unsubscribe waiting for its grace period.
    pending: Option<Deferred>,
}

/// Per-topic intent state, owned by the link state.
#[derive(Debug, Default)]
pub(crate) struct TopicTable {
    entries: HashMap<Topic, TopicEntry>,
    next_token: u64,
}

impl TopicTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare interest in `topic`.
    ///
    /// Cancels a pending unsubscribe. Returns true if a subscribe intent must
    /// be sent, i.e. the topic is not already active.
    pub(crate) fn declare(&mut self, topic: &Topic) -> bool {
        let entry = self.entries.entry(topic.clone()).or_default();
        if let Some(pending) = entry.pending.take() {
            debug!(topic = %topic, "Cancelled pending unsubscribe");
            pending.cancel();
        }
        !entry.active
    }

    /// Record that the subscribe intent for `topic` was accepted by the link.
    pub(crate) fn mark_active(&mut self, topic: &Topic) {
        self.entries.entry(topic.clone()).or_default().active = true;
    }

    /// Retract interest in `topic`, arming the grace timer.
    ///
    /// Any earlier pending unsubscribe for the topic is replaced. `on_fire`
    /// receives the token that [`TopicTable::expire`] expects.
    pub(crate) fn retract<F>(&mut self, topic: &Topic, runtime: &Handle, grace: Duration, on_fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.next_token = self.next_token.wrapping_add(1);
        let token = self.next_token;
        let entry = self.entries.entry(topic.clone()).or_default();
        if let Some(previous) = entry.pending.take() {
            previous.cancel();
        }
        entry.pending = Some(Deferred::spawn(runtime, token, grace, on_fire));
    }

    /// Accept an expired grace timer.
    ///
    /// Returns true if the unsubscribe intent must be sent; the topic is then
    /// forgotten. Cancelled or superseded timers return false.
    pub(crate) fn expire(&mut self, topic: &Topic, token: u64) -> bool {
        let current = self
            .entries
            .get(topic)
            .and_then(|entry| entry.pending.as_ref())
            .is_some_and(|pending| pending.token() == token);
        if current {
            self.entries.remove(topic);
        }
        current
    }

    /// Forget every topic and cancel every pending unsubscribe.
    pub(crate) fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            if let Some(pending) = entry.pending {
                pending.cancel();
            }
        }
    }

    /// Topics whose subscribe intent is in effect, sorted.
    pub(crate) fn active(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn has_pending_unsubscribe(&self, topic: &Topic) -> bool {
        self.entries
            .get(topic)
            .is_some_and(|entry| entry.pending.is_some())
    }
}
