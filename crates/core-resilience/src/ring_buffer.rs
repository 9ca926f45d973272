//! Bounded ring buffer with drop-oldest eviction
//!
//! Holds the most recent `capacity` records in insertion order. Used for the
//! in-memory log history served to the operator surface.
//!
//! # Example
//!
//! ```
//! use warden_core_resilience::RingBuffer;
//!
//! let mut buffer = RingBuffer::new(2);
//! buffer.push("a");
//! buffer.push("b");
//! buffer.push("c"); // evicts "a"
//!
//! assert_eq!(buffer.recent(10), vec!["b", "c"]);
//! ```

use std::collections::VecDeque;

/// Default capacity of the in-memory log history
pub const DEFAULT_CAPACITY: usize = 200;

/// Bounded history that drops its oldest entry when full
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
    total_received: u64,
    total_dropped: u64,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_received: 0,
            total_dropped: 0,
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&mut self, entry: T) {
        self.total_received += 1;

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.total_dropped += 1;
        }

        self.entries.push_back(entry);
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupancy and eviction counters
    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            current_count: self.entries.len(),
            capacity: self.capacity,
            total_received: self.total_received,
            total_dropped: self.total_dropped,
        }
    }
}

impl<T: Clone> RingBuffer<T> {
    /// The last `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for entry in iter {
            self.push(entry);
        }
    }
}

/// Counters for the ring buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBufferStats {
    pub current_count: usize,
    pub capacity: usize,
    pub total_received: u64,
    pub total_dropped: u64,
}
