use std::collections::VecDeque;

use bytes::Bytes;
use killalot_frame::Datagram;

/// A named, prioritized sequence of encoded frames waiting to be sent.
///
/// Lower `priority` values are more urgent. Frames are handed out in order
/// and never put back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTransaction {
    name: String,
    priority: u32,
    frames: VecDeque<Bytes>,
    total: usize,
}

impl OutgoingTransaction {
    /// Build from already-encoded wire frames.
    pub fn new(
        name: impl Into<String>,
        priority: u32,
        frames: impl IntoIterator<Item = Bytes>,
    ) -> Self {
        let frames: VecDeque<Bytes> = frames.into_iter().collect();
        Self {
            name: name.into(),
            priority,
            total: frames.len(),
            frames,
        }
    }

    /// Encode `datagrams` and build a transaction from them.
    pub fn from_datagrams(
        name: impl Into<String>,
        priority: u32,
        datagrams: impl IntoIterator<Item = Datagram>,
    ) -> Self {
        Self::new(name, priority, datagrams.into_iter().map(|d| d.encode()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Frame count at creation.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Frames not yet taken.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// True once any frame has been taken.
    pub fn has_started(&self) -> bool {
        self.frames.len() < self.total
    }

    /// Percentage of frames taken; 100 for an empty transaction.
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.total - self.frames.len()) * 100 / self.total) as u8
    }

    /// Take the next frame.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Frames not yet taken, in send order.
    pub fn frames(&self) -> impl Iterator<Item = &Bytes> {
        self.frames.iter()
    }

    /// Total wire bytes not yet taken.
    pub fn pending_bytes(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }
}
