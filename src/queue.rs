//! Bounded two-lane queue
//!
//! One queue exists per signal kind. The priority lane always drains first.
//! When the bound is exceeded the oldest normal item goes first; the priority
//! lane only loses items once the normal lane is empty.

use std::collections::VecDeque;

use crate::model::{Lane, SignalKind, TelemetryItem};

/// An item together with the lane it was enqueued on
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedItem {
    pub item: TelemetryItem,
    pub lane: Lane,
}

/// Ordered items of one kind, drained together and shipped in one request
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    kind: SignalKind,
    entries: Vec<QueuedItem>,
}

impl Batch {
    pub fn new(kind: SignalKind, entries: Vec<QueuedItem>) -> Self {
        Self { kind, entries }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// `Priority` if any entry came from the priority lane
    pub fn lane(&self) -> Lane {
        if self.entries.iter().any(|e| e.lane == Lane::Priority) {
            Lane::Priority
        } else {
            Lane::Normal
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &TelemetryItem> {
        self.entries.iter().map(|e| &e.item)
    }

    /// Drop the entries at the given positions, keeping the rest in order
    pub fn remove_positions(&mut self, positions: impl IntoIterator<Item = usize>) {
        let doomed: std::collections::BTreeSet<usize> = positions.into_iter().collect();
        if doomed.is_empty() {
            return;
        }
        let mut index = 0;
        self.entries.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });
    }

    /// Append another batch of the same kind, keeping order
    pub fn extend(&mut self, other: Batch) {
        debug_assert_eq!(self.kind, other.kind);
        self.entries.extend(other.entries);
    }
}

/// Per-kind queue with a priority lane and a normal lane
#[derive(Debug)]
pub struct BoundedPriorityQueue {
    kind: SignalKind,
    priority: VecDeque<QueuedItem>,
    normal: VecDeque<QueuedItem>,
    max_size: usize,
}

impl BoundedPriorityQueue {
    pub fn new(kind: SignalKind, max_size: usize) -> Self {
        Self {
            kind,
            priority: VecDeque::new(),
            normal: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Append an item. Returns whatever had to be evicted to stay in bounds.
    pub fn enqueue(&mut self, item: TelemetryItem, lane: Lane) -> Option<QueuedItem> {
        let entry = QueuedItem { item, lane };
        match lane {
            Lane::Priority => self.priority.push_back(entry),
            Lane::Normal => self.normal.push_back(entry),
        }
        self.evict_overflow().pop()
    }

    /// Take up to `max_items`, priority lane first
    pub fn dequeue_batch(&mut self, max_items: usize) -> Batch {
        let mut entries = Vec::with_capacity(max_items.min(self.pending_count()));

        while entries.len() < max_items {
            match self.priority.pop_front() {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }
        while entries.len() < max_items {
            match self.normal.pop_front() {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }

        Batch::new(self.kind, entries)
    }

    /// Put a failed batch back ahead of everything queued in the same lane.
    ///
    /// Entries return to the lane they came from. Returns items evicted if the
    /// queue overflowed as a result.
    pub fn requeue_front(&mut self, batch: Batch) -> Vec<QueuedItem> {
        for entry in batch.entries.into_iter().rev() {
            match entry.lane {
                Lane::Priority => self.priority.push_front(entry),
                Lane::Normal => self.normal.push_front(entry),
            }
        }
        self.evict_overflow()
    }

    fn evict_overflow(&mut self) -> Vec<QueuedItem> {
        let mut evicted = Vec::new();
        while self.pending_count() > self.max_size {
            let oldest = self.normal.pop_front().or_else(|| self.priority.pop_front());
            match oldest {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    pub fn pending_count(&self) -> usize {
        self.priority.len() + self.normal.len()
    }

    pub fn lane_len(&self, lane: Lane) -> usize {
        match lane {
            Lane::Priority => self.priority.len(),
            Lane::Normal => self.normal.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }
}
