use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use killalot_protocol::OutgoingTransaction;
use tracing::{debug, trace};

use crate::error::{LinkError, Result};

/// Priority queue of outgoing transactions.
///
/// Ordered by ascending priority, ties broken by insertion order. Every
/// operation runs under one lock; waiters are woken on enqueue.
pub struct OutgoingQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    wakeups: u64,
}

struct Entry {
    seq: u64,
    tx: OutgoingTransaction,
}

impl Entry {
    fn key(&self) -> (u32, u64) {
        (self.tx.priority(), self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap and the smallest key drains first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl OutgoingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a transaction, explaining a rejection.
    pub fn try_enqueue(&self, tx: OutgoingTransaction) -> Result<()> {
        let mut state = self.lock();
        if state.heap.len() >= self.capacity {
            return Err(LinkError::QueueFull {
                capacity: self.capacity,
            });
        }
        if state.heap.iter().any(|e| e.tx.name() == tx.name()) {
            return Err(LinkError::DuplicateName(tx.name().to_string()));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        trace!(name = tx.name(), priority = tx.priority(), frames = tx.total(), "enqueued");
        state.heap.push(Entry { seq, tx });
        drop(state);

        self.ready.notify_all();
        Ok(())
    }

    /// Queue a transaction. False when the queue is full or the name is taken.
    pub fn enqueue(&self, tx: OutgoingTransaction) -> bool {
        match self.try_enqueue(tx) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "enqueue rejected");
                false
            }
        }
    }

    /// Remove a transaction none of whose frames have been taken.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.lock();
        let removable = state
            .heap
            .iter()
            .any(|e| e.tx.name() == name && !e.tx.has_started());
        if removable {
            state.heap.retain(|e| e.tx.name() != name);
            trace!(name, "removed");
        }
        removable
    }

    /// Queue contents in drain order. The queue is not modified.
    pub fn snapshot(&self) -> Vec<OutgoingTransaction> {
        let state = self.lock();
        let mut entries: Vec<&Entry> = state.heap.iter().collect();
        entries.sort_by_key(|e| e.key());
        entries.into_iter().map(|e| e.tx.clone()).collect()
    }

    /// Take the next frame of the most urgent transaction, dropping the
    /// transaction once it is exhausted.
    pub fn drain_next_frame(&self) -> Option<Bytes> {
        let mut state = self.lock();
        loop {
            let mut top = state.heap.peek_mut()?;
            match top.tx.next_frame() {
                Some(frame) => {
                    if top.tx.is_empty() {
                        let done = PeekMut::pop(top);
                        trace!(name = done.tx.name(), "transaction drained");
                    }
                    return Some(frame);
                }
                None => {
                    PeekMut::pop(top);
                }
            }
        }
    }

    /// Block until a transaction is queued, [`Self::wake_all`] is called, or
    /// `timeout` passes.
    ///
    /// Returns whether the queue is non-empty.
    pub fn wait_for_frames(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let wakeups = state.wakeups;
        let (state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| {
                s.heap.is_empty() && s.wakeups == wakeups
            })
            .unwrap_or_else(PoisonError::into_inner);
        !state.heap.is_empty()
    }

    /// Release every thread blocked in [`Self::wait_for_frames`].
    pub fn wake_all(&self) {
        self.lock().wakeups += 1;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every queued transaction. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let n = state.heap.len();
        state.heap.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    fn tx(name: &str, priority: u32, frames: usize) -> OutgoingTransaction {
        let frames = (0..frames).map(|i| Bytes::from(format!("{name}:{i}")));
        OutgoingTransaction::new(name, priority, frames)
    }

    fn drain_all(queue: &OutgoingQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.drain_next_frame())
            .map(|f| String::from_utf8(f.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn drains_by_priority_then_insertion() {
        let queue = OutgoingQueue::new(8);
        assert!(queue.enqueue(tx("a", 3, 1)));
        assert!(queue.enqueue(tx("b", 1, 2)));
        assert!(queue.enqueue(tx("c", 2, 1)));
        assert!(queue.enqueue(tx("d", 1, 1)));

        assert_eq!(drain_all(&queue), vec!["b:0", "b:1", "d:0", "c:0", "a:0"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn snapshot_matches_drain_order_without_mutating() {
        let queue = OutgoingQueue::new(8);
        for (name, priority) in [("a", 3), ("b", 1), ("c", 2), ("d", 1)] {
            queue.enqueue(tx(name, priority, 2));
        }

        let names: Vec<String> = queue.snapshot().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["b", "d", "c", "a"]);
        assert_eq!(queue.len(), 4);
        assert!(queue.snapshot().iter().all(|t| t.remaining() == 2));
    }

    #[test]
    fn capacity_and_duplicates_are_rejected() {
        let queue = OutgoingQueue::new(2);
        assert!(queue.try_enqueue(tx("a", 0, 1)).is_ok());
        assert!(matches!(
            queue.try_enqueue(tx("a", 1, 1)),
            Err(LinkError::DuplicateName(name)) if name == "a"
        ));
        assert!(queue.enqueue(tx("b", 0, 1)));
        assert!(matches!(
            queue.try_enqueue(tx("c", 0, 1)),
            Err(LinkError::QueueFull { capacity: 2 })
        ));
        assert!(!queue.enqueue(tx("c", 0, 1)));
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    fn remove_only_before_first_frame() {
        let queue = OutgoingQueue::new(4);
        queue.enqueue(tx("busy", 0, 3));
        queue.enqueue(tx("idle", 5, 3));

        assert_eq!(queue.drain_next_frame().as_deref(), Some(&b"busy:0"[..]));
        assert!(!queue.remove("busy"));
        assert!(queue.remove("idle"));
        assert!(!queue.remove("idle"));
        assert!(!queue.remove("missing"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn urgent_transaction_preempts_started_one() {
        let queue = OutgoingQueue::new(4);
        queue.enqueue(tx("bulk", 3, 3));
        assert_eq!(queue.drain_next_frame().as_deref(), Some(&b"bulk:0"[..]));

        queue.enqueue(tx("stick", 0, 1));
        assert_eq!(drain_all(&queue), vec!["stick:0", "bulk:1", "bulk:2"]);
    }

    #[test]
    fn empty_transactions_are_skipped() {
        let queue = OutgoingQueue::new(4);
        queue.enqueue(OutgoingTransaction::new("nothing", 0, Vec::new()));
        queue.enqueue(tx("x", 1, 1));
        assert_eq!(drain_all(&queue), vec!["x:0"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_wakes_waiter() {
        let queue = Arc::new(OutgoingQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let start = Instant::now();
                let ready = queue.wait_for_frames(Duration::from_secs(5));
                (ready, start.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        queue.enqueue(tx("wake", 0, 1));
        let (ready, waited) = waiter.join().unwrap();
        assert!(ready);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn wake_all_releases_waiter() {
        let queue = Arc::new(OutgoingQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.wait_for_frames(Duration::from_secs(5)))
        };

        std::thread::sleep(Duration::from_millis(20));
        queue.wake_all();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn wait_times_out_when_idle() {
        let queue = OutgoingQueue::new(1);
        assert!(!queue.wait_for_frames(Duration::from_millis(10)));
        queue.enqueue(tx("x", 0, 1));
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_drain_yields_each_frame_once() {
        const FRAMES: usize = 20_000;
        let queue = Arc::new(OutgoingQueue::new(4));
        queue.enqueue(tx("bulk", 0, FRAMES));

        let drainers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || drain_all(&queue))
            })
            .collect();
        let drained: Vec<String> = drainers
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        let unique: HashSet<&String> = drained.iter().collect();
        assert_eq!(drained.len(), FRAMES);
        assert_eq!(unique.len(), FRAMES);
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_and_remove_race_with_drain() {
        const TRANSACTIONS: usize = 200;
        const FRAMES: usize = 5;
        let queue = Arc::new(OutgoingQueue::new(TRANSACTIONS));
        let producing = Arc::new(AtomicBool::new(true));

        let producer = {
            let queue = Arc::clone(&queue);
            let producing = Arc::clone(&producing);
            std::thread::spawn(move || {
                for i in 0..TRANSACTIONS {
                    assert!(queue.enqueue(tx(&format!("t{i}"), (i % 4) as u32, FRAMES)));
                }
                producing.store(false, AtomicOrdering::Release);
            })
        };
        let remover = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                (0..TRANSACTIONS)
                    .step_by(2)
                    .map(|i| format!("t{i}"))
                    .filter(|name| queue.remove(name))
                    .collect::<HashSet<String>>()
            })
        };
        let drainers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let producing = Arc::clone(&producing);
                std::thread::spawn(move || {
                    let mut drained = Vec::new();
                    loop {
                        match queue.drain_next_frame() {
                            Some(frame) => drained.push(String::from_utf8(frame.to_vec()).unwrap()),
                            None if producing.load(AtomicOrdering::Acquire) => {
                                std::thread::yield_now()
                            }
                            None => break,
                        }
                    }
                    drained
                })
            })
            .collect();

        producer.join().unwrap();
        let removed = remover.join().unwrap();
        let mut drained: Vec<String> = drainers
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        // The remover may finish after the drainers saw an empty queue.
        drained.extend(drain_all(&queue));

        let unique: HashSet<&String> = drained.iter().collect();
        assert_eq!(unique.len(), drained.len());
        for i in 0..TRANSACTIONS {
            let name = format!("t{i}");
            let prefix = format!("{name}:");
            let sent = drained.iter().filter(|f| f.starts_with(&prefix)).count();
            let expected = if removed.contains(&name) { 0 } else { FRAMES };
            assert_eq!(sent, expected, "{name}");
        }
        assert!(queue.is_empty());
    }
}
