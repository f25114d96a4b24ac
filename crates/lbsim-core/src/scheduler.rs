//! Time-ordered event queue.
//!
//! A min-heap of events keyed by virtual timestamp. Events scheduled for the
//! same instant pop in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A timestamped event for the priority queue.
#[derive(Debug, Clone)]
pub struct TimedEvent<E> {
    pub time_us: u64,
    sequence: u64,
    pub event: E,
}

impl<E> PartialEq for TimedEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time_us == other.time_us && self.sequence == other.sequence
    }
}

impl<E> Eq for TimedEvent<E> {}

impl<E> PartialOrd for TimedEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for TimedEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want min-heap
        other
            .time_us
            .cmp(&self.time_us)
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// Event queue ordered by `(time, insertion sequence)`.
#[derive(Debug, Clone)]
pub struct EventQueue<E> {
    heap: BinaryHeap<TimedEvent<E>>,
    sequence: u64,
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Schedule `event` at absolute time `time_us`.
    pub fn schedule_at(&mut self, time_us: u64, event: E) {
        self.heap.push(TimedEvent {
            time_us,
            sequence: self.sequence,
            event,
        });
        self.sequence += 1;
    }

    /// Pop the earliest event.
    pub fn pop(&mut self) -> Option<TimedEvent<E>> {
        self.heap.pop()
    }

    /// Time of the earliest pending event.
    pub fn peek_time(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.time_us)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Drop pending events for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&E) -> bool) {
        self.heap.retain(|e| keep(&e.event));
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
