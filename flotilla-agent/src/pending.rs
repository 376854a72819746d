//! Staging buffer for removals observed while leaderless.
//!
//! A leader whose own death produced the `removed` event is not around
//! to act on it. Every surviving citizen stages the event here; whoever
//! wins the next election drains the buffer and runs the removal
//! pipeline, preserving single-writer semantics without a consensus log.
//! Recognizing any leader clears the buffer, drained or not.

use flotilla_core::PeerInfo;

#[derive(Debug, Default)]
pub struct PendingRemovals {
    queue: Vec<PeerInfo>,
}

impl PendingRemovals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, peer: PeerInfo) {
        self.queue.push(peer);
    }

    /// Take the buffered removals in insertion order, leaving the buffer
    /// empty.
    pub fn drain(&mut self) -> Vec<PeerInfo> {
        std::mem::take(&mut self.queue)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
