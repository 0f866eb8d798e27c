//! Bounded FIFO of recently relayed frames.

use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of frames kept for late joiners.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Insertion-ordered buffer of serialized payloads.
///
/// Invariant: `len() <= capacity()`. Appending past capacity evicts exactly
/// one frame from the head. A capacity of zero keeps nothing.
#[derive(Debug)]
pub struct HistoryBuffer {
    frames: VecDeque<Arc<String>>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame at the tail, returning the evicted head frame if any.
    pub fn append(&mut self, frame: Arc<String>) -> Option<Arc<String>> {
        if self.capacity == 0 {
            return Some(frame);
        }
        self.frames.push_back(frame);
        if self.frames.len() > self.capacity {
            self.frames.pop_front()
        } else {
            None
        }
    }

    /// Current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<String>> {
        self.frames.iter().cloned().collect()
    }

    /// Number of frames held.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the buffer holds nothing.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of frames held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
