//! Priority event queue shared by the receive, resolve and broadcast stages.
//!
//! Producers call [`PriorityEventQueue::insert`] from any task without
//! blocking. The single consumer of each queue awaits
//! [`PriorityEventQueue::remove`], which parks until an item is available and
//! then yields the highest priority item. Items of equal priority come out in
//! insertion order, so resolution stays deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Relative urgency of an event. Larger values are removed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    /// Ordinary player commands.
    pub const NORMAL: Priority = Priority(1);
    /// Movement and server notifications.
    pub const HIGH: Priority = Priority(2);
}

struct Entry<T> {
    priority: Priority,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Max-heap: higher priority first, then the older sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub struct PriorityEventQueue<T> {
    heap: Mutex<BinaryHeap<Entry<T>>>,
    next_sequence: AtomicU64,
    available: Notify,
}

impl<T> PriorityEventQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_sequence: AtomicU64::new(0),
            available: Notify::new(),
        }
    }

    /// Adds an item. Never waits on a consumer.
    pub fn insert(&self, item: T, priority: Priority) {
        let mut heap = self.lock();
        // Sequence is taken under the lock so heap order matches call order.
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        heap.push(Entry {
            priority,
            sequence,
            item,
        });
        drop(heap);
        self.available.notify_one();
    }

    /// Waits until an item is available and returns the most urgent one.
    pub async fn remove(&self) -> T {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_remove() {
                return item;
            }

            notified.await;
        }
    }

    /// Pops the most urgent item if one is queued right now.
    pub fn try_remove(&self) -> Option<T> {
        self.lock().pop().map(|entry| entry.item)
    }

    /// Only a hint: another task may insert or remove right after this returns.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BinaryHeap<Entry<T>>> {
        // A panic while holding the lock cannot leave the heap half-updated.
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for PriorityEventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
