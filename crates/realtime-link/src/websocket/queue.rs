//! Bounded FIFO of payloads waiting for an open transport.

use std::collections::VecDeque;

use tracing::warn;

use crate::codec::Payload;

#[derive(Debug)]
pub(crate) struct OutboundQueue {
    entries: VecDeque<Payload>,
    capacity: usize,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append at the tail. When full, the oldest entry is dropped.
    pub(crate) fn push(&mut self, payload: Payload) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            warn!(
                capacity = self.capacity,
                "Outbound queue full, dropping oldest message"
            );
        }
        self.entries.push_back(payload);
    }

    /// Take every entry in FIFO order, leaving the queue empty.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Payload> + '_ {
        self.entries.drain(..)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
