use super::TimerThunk;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

struct Entry {
    deadline: Instant,
    seq: u64,
    thunk: TimerThunk,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed so that the earliest deadline surfaces first; ties
        // break by insertion order
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A `DelayHeap` holds registered thunks ordered by their deadlines.
///
/// It only tracks deadlines -- the owning thread is responsible for
/// deciding when to sleep (`until_next`) and for draining everything
/// that has become due (`pop_due`).
pub(crate) struct DelayHeap {
    entries: BinaryHeap<Entry>,
    seq: u64,
}

impl DelayHeap {
    pub(crate) fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Register a thunk to surface once `deadline` has passed.
    pub(crate) fn push(&mut self, deadline: Instant, thunk: TimerThunk) {
        let seq = self.seq;
        self.seq += 1;

        self.entries.push(Entry {
            deadline,
            seq,
            thunk,
        });
    }

    /// Time remaining until the earliest deadline, zero if it has already
    /// passed, or `None` if nothing is registered.
    pub(crate) fn until_next(&self, now: Instant) -> Option<Duration> {
        self.entries
            .peek()
            .map(|e| e.deadline.saturating_duration_since(now))
    }

    /// Pops the earliest registered thunk if its deadline has passed.
    /// Call in a loop to drain everything that is due.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<TimerThunk> {
        match self.entries.peek() {
            Some(e) if e.deadline <= now => self.entries.pop().map(|e| e.thunk),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
