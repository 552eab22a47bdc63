//! Deadline queue for delay and repeat watchers.
//!
//! Timers are stored in a binary heap ordered by deadline. Cancelling a timer
//! only forgets its generation; the stale heap entry is skipped when it
//! surfaces.

use crate::reactor::watcher::WatcherId;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// An entry in the timer heap.
struct TimerEntry {
    deadline: Instant,

    /// Insertion order, breaks ties between equal deadlines.
    sequence: u64,

    id: WatcherId,
    generation: u64,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap` pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Armed timer state: generation plus the interval for repeating timers.
struct Armed {
    generation: u64,
    interval: Option<Duration>,
}

#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    armed: HashMap<WatcherId, Armed>,
    sequence: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms a timer firing `after` from `now`. Re-arming replaces the previous deadline.
    pub(crate) fn insert(&mut self, id: WatcherId, after: Duration, repeat: bool, now: Instant) {
        self.sequence += 1;
        let generation = self.sequence;

        let interval = repeat.then_some(after);
        self.armed.insert(id.clone(), Armed { generation, interval });
        self.push(id, now + after, generation);
    }

    pub(crate) fn remove(&mut self, id: &WatcherId) {
        self.armed.remove(id);
        if self.armed.is_empty() {
            self.heap.clear();
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Time left until the earliest live deadline.
    pub(crate) fn next_remaining(&mut self, now: Instant) -> Option<Duration> {
        self.discard_stale();

        self.heap
            .peek()
            .map(|entry| entry.deadline.saturating_duration_since(now))
    }

    /// Pops every timer due at `now`, re-arming repeating ones.
    ///
    /// A repeating timer fires at most once per call, even with a zero interval.
    pub(crate) fn expire(&mut self, now: Instant, fired: &mut Vec<WatcherId>) {
        let mut rearmed = Vec::new();

        loop {
            self.discard_stale();

            let due = matches!(self.heap.peek(), Some(entry) if entry.deadline <= now);
            if !due {
                break;
            }

            let Some(entry) = self.heap.pop() else {
                break;
            };

            match self.armed.get(&entry.id).and_then(|armed| armed.interval) {
                Some(interval) => rearmed.push((entry.id.clone(), now + interval, entry.generation)),
                None => {
                    self.armed.remove(&entry.id);
                }
            }

            fired.push(entry.id);
        }

        for (id, deadline, generation) in rearmed {
            self.push(id, deadline, generation);
        }
    }

    fn push(&mut self, id: WatcherId, deadline: Instant, generation: u64) {
        self.sequence += 1;

        self.heap.push(TimerEntry {
            deadline,
            sequence: self.sequence,
            id,
            generation,
        });
    }

    // Drops heap entries whose watcher was cancelled or re-armed.
    fn discard_stale(&mut self) {
        while let Some(entry) = self.heap.peek() {
            let live = self
                .armed
                .get(&entry.id)
                .is_some_and(|armed| armed.generation == entry.generation);

            if live {
                return;
            }

            self.heap.pop();
        }
    }
}
