//! Bounded FIFO ring buffer.
//!
//! Used as the wait queue of mutexes and semaphores. `put` on a full buffer
//! evicts the oldest element so the newest is always kept.

use crate::config::MAX_THREADS;
use crate::thread::ThreadId;

/// Wait queue of blocked threads. One slot per possible thread.
pub type WaitQueue = RingBuffer<ThreadId, MAX_THREADS>;

/// Fixed-capacity FIFO of `N` copyable elements.
#[derive(Debug, Clone)]
pub struct RingBuffer<T: Copy, const N: usize> {
    slots: [Option<T>; N],
    /// Next slot to write.
    head: usize,
    /// Oldest element.
    tail: usize,
    empty: bool,
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            slots: [None; N],
            head: 0,
            tail: 0,
            empty: true,
        }
    }

    /// Append `value`.
    ///
    /// When the buffer is full the oldest element is dropped to make room and
    /// returned.
    pub fn put(&mut self, value: T) -> Option<T> {
        if N == 0 {
            return Some(value);
        }

        let evicted = if self.is_full() {
            let oldest = self.slots[self.tail].take();
            self.tail = (self.tail + 1) % N;
            oldest
        } else {
            None
        };

        self.slots[self.head] = Some(value);
        self.head = (self.head + 1) % N;
        self.empty = false;
        evicted
    }

    /// Remove and return the oldest element.
    pub fn get(&mut self) -> Option<T> {
        if self.empty {
            return None;
        }

        let value = self.slots[self.tail].take();
        self.tail = (self.tail + 1) % N;
        self.empty = self.tail == self.head;
        value
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_full(&self) -> bool {
        !self.empty && self.head == self.tail
    }

    /// Number of buffered elements.
    pub fn len(&self) -> usize {
        if self.empty {
            0
        } else if self.head > self.tail {
            self.head - self.tail
        } else {
            N - self.tail + self.head
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every element.
    pub fn reset(&mut self) {
        self.slots = [None; N];
        self.head = 0;
        self.tail = 0;
        self.empty = true;
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).filter_map(move |i| self.slots[(self.tail + i) % N])
    }
}

impl<T: Copy + PartialEq, const N: usize> RingBuffer<T, N> {
    pub fn contains(&self, value: T) -> bool {
        self.iter().any(|queued| queued == value)
    }
}

impl<T: Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
