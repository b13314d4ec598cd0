use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::node::{random_level, Node, MAX_LEVEL};
use crossbeam_utils::{Backoff, CachePadded};
use kule::{enter, Domain, HazardGuard, Shared};

// Slot-band layout for one traversal: a pred and a curr pin per level, one
// successor probe, one extraction candidate.
const SLOT_PRED: usize = 0;
const SLOT_CURR: usize = MAX_LEVEL + 1;
const SLOT_SUCC: usize = 2 * (MAX_LEVEL + 1);
const SLOT_CANDIDATE: usize = SLOT_SUCC + 1;

const _: () = assert!(SLOT_CANDIDATE < kule::SLOTS_PER_THREAD);

/// An unbounded multi-producer multi-consumer min-priority queue.
///
/// Entries are ordered by `T`'s `Ord`; duplicates are allowed and come out
/// in an arbitrary order among themselves. `push` and `pop` are lock-free:
/// contended operations retry, but some operation always completes.
///
/// Nodes unlinked by `pop` are handed to a [`Domain`] and freed once no
/// traversal can still reference them.
///
/// # Example
///
/// ```
/// use kule_pq::PriorityQueue;
///
/// let pq = PriorityQueue::new();
/// pq.push(3u64);
/// pq.push(1);
/// pq.push(2);
/// assert_eq!(pq.pop(), Some(1));
/// assert_eq!(pq.pop(), Some(2));
/// assert_eq!(pq.pop(), Some(3));
/// assert_eq!(pq.pop(), None);
/// ```
pub struct PriorityQueue<T> {
    head: *mut Node<T>,
    tail: *mut Node<T>,
    /// Approximate element count; a liveness hint, not linearizable.
    len: CachePadded<AtomicUsize>,
    domain: Arc<Domain>,
}

unsafe impl<T: Send + Sync> Send for PriorityQueue<T> {}
unsafe impl<T: Send + Sync> Sync for PriorityQueue<T> {}

impl<T> PriorityQueue<T>
where
    T: Ord + Clone + Send + Sync + 'static,
{
    /// Creates an empty queue bound to the process-default domain.
    pub fn new() -> Self {
        Self::with_domain(Arc::clone(Domain::global()))
    }

    /// Creates an empty queue bound to `domain`. Scoped domains make
    /// reclamation observable in tests.
    pub fn with_domain(domain: Arc<Domain>) -> Self {
        let head = Box::into_raw(Box::new(Node::sentinel()));
        let tail = Box::into_raw(Box::new(Node::<T>::sentinel()));
        for level in 0..=MAX_LEVEL {
            // Pre-publication: the queue is not shared yet.
            unsafe {
                (*head).next[level].store(Shared::from_raw(tail), Ordering::Relaxed);
            }
        }
        Self {
            head,
            tail,
            len: CachePadded::new(AtomicUsize::new(0)),
            domain,
        }
    }

    /// Inserts `value`.
    pub fn push(&self, value: T) {
        self.push_with_level(value, random_level());
    }

    fn push_with_level(&self, value: T, top_level: usize) {
        let guard = enter(&self.domain);
        let mut preds = [Shared::null(); MAX_LEVEL + 1];
        let mut succs = [Shared::null(); MAX_LEVEL + 1];

        // Allocated before the node is ever visible: a failed allocation
        // leaves the queue untouched.
        let node_ptr = Box::into_raw(Box::new(Node::with_value(value, top_level)));
        let node = unsafe { Shared::from_raw(node_ptr) };
        let key = unsafe { (*node_ptr).value() };

        loop {
            let _ = self.find(key, &mut preds, &mut succs, &guard);
            for level in 0..=top_level {
                unsafe { &*node_ptr }.next[level].store(succs[level], Ordering::Relaxed);
            }
            // Linearization point: the bottom-level splice. From here the
            // node is reachable and owned by the queue.
            if unsafe { preds[0].deref() }.next[0]
                .compare_exchange(succs[0], node, Ordering::AcqRel, Ordering::Acquire, &guard)
                .is_ok()
            {
                break;
            }
        }

        for level in 1..=top_level {
            loop {
                if unsafe { preds[level].deref() }.next[level]
                    .compare_exchange(succs[level], node, Ordering::AcqRel, Ordering::Acquire, &guard)
                    .is_ok()
                {
                    break;
                }
                let _ = self.find(key, &mut preds, &mut succs, &guard);
                // Refresh our own link before re-attempting. Level `level`
                // of this node is unreachable until the splice above
                // succeeds, so the store cannot be observed mid-flight.
                unsafe { &*node_ptr }.next[level].store(succs[level], Ordering::Release);
            }
        }

        unsafe { &*node_ptr }.fully_linked.store(true, Ordering::Release);
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Extracts the least entry, or `None` when the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = enter(&self.domain);
        let backoff = Backoff::new();
        let head = unsafe { &*self.head };
        loop {
            let curr = guard.protect(SLOT_CANDIDATE, &head.next[0]);
            if curr.as_raw() == self.tail {
                return None;
            }
            let node = unsafe { curr.deref() };
            if !node.fully_linked.load(Ordering::Acquire) {
                // Mid-insertion; the inserter publishes shortly.
                backoff.snooze();
                continue;
            }
            if node
                .marked
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // Another consumer won this node.
                backoff.spin();
                continue;
            }
            // Linearization point passed: this consumer owns the entry. The
            // value is cloned, not moved; traversals may keep comparing
            // against the stored value until the node is reclaimed.
            let value = unsafe { node.value() }.clone();
            self.unlink(curr, &value, &guard);
            self.len.fetch_sub(1, Ordering::Relaxed);
            // SAFETY: `unlink` completed, so the node is unreachable from
            // the sentinels and is retired exactly once, by its extractor.
            unsafe { self.domain.retire(curr.as_raw()) };
            return Some(value);
        }
    }

    /// Approximate number of entries. A liveness hint only; not
    /// linearizable with concurrent `push`/`pop`.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Approximate emptiness check; see [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locates the window for `key` at every level.
    ///
    /// On return `preds[l]` is the last node ordered strictly before `key`
    /// at level `l` (possibly head) and `succs[l]` its successor at that
    /// level (possibly tail); both stay pinned in the per-level slots until
    /// the guard drops or the next traversal. Marked nodes encountered on
    /// the way are unlinked in passing. Returns true iff `succs[0]` is an
    /// entry equal to `key`.
    fn find<'g>(
        &self,
        key: &T,
        preds: &mut [Shared<'g, Node<T>>; MAX_LEVEL + 1],
        succs: &mut [Shared<'g, Node<T>>; MAX_LEVEL + 1],
        guard: &'g HazardGuard,
    ) -> bool {
        // Sentinels are never retired, so pinning them costs nothing.
        let mut pred: Shared<'g, Node<T>> = unsafe { Shared::from_raw(self.head) };
        for level in (0..=MAX_LEVEL).rev() {
            guard.shield(SLOT_PRED + level, pred);
            let pred_ref = unsafe { pred.deref() };
            let mut curr = guard.protect(SLOT_CURR + level, &pred_ref.next[level]);
            loop {
                // Tail is the universal successor: identity check before any
                // value access.
                if curr.as_raw() == self.tail {
                    break;
                }
                let curr_ref = unsafe { curr.deref() };
                let succ = guard.protect(SLOT_SUCC, &curr_ref.next[level]);
                if curr_ref.marked.load(Ordering::Acquire) {
                    // Help the extractor: swing pred past the dead node. On
                    // contention, re-read the window from pred.
                    let pred_ref = unsafe { pred.deref() };
                    match pred_ref.next[level].compare_exchange(
                        curr,
                        succ,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => curr = guard.shield(SLOT_CURR + level, succ),
                        Err(_) => {
                            curr = guard.protect(SLOT_CURR + level, &pred_ref.next[level]);
                        }
                    }
                    continue;
                }
                if unsafe { curr_ref.value() } < key {
                    pred = guard.shield(SLOT_PRED + level, curr);
                    curr = guard.shield(SLOT_CURR + level, succ);
                } else {
                    break;
                }
            }
            preds[level] = pred;
            succs[level] = curr;
        }
        succs[0].as_raw() != self.tail && unsafe { succs[0].deref().value() } == key
    }

    /// Physically unlinks a marked node from every level it occupies.
    ///
    /// Walks by key but advances through equal keys until it reaches `node`
    /// itself, so a duplicate inserted ahead of the victim cannot mask it.
    /// Every unlink CAS is by node identity; contended failures re-read the
    /// window. On return the node is unreachable from the sentinels, which
    /// is what makes the subsequent retire sound.
    fn unlink<'g>(&self, node: Shared<'g, Node<T>>, key: &T, guard: &'g HazardGuard) {
        let top_level = unsafe { node.deref() }.top_level;
        let mut pred: Shared<'g, Node<T>> = unsafe { Shared::from_raw(self.head) };
        for level in (0..=top_level).rev() {
            guard.shield(SLOT_PRED + level, pred);
            let pred_ref = unsafe { pred.deref() };
            let mut curr = guard.protect(SLOT_CURR + level, &pred_ref.next[level]);
            loop {
                if curr.as_raw() == self.tail {
                    // A helping traversal got here first.
                    break;
                }
                let curr_ref = unsafe { curr.deref() };
                let succ = guard.protect(SLOT_SUCC, &curr_ref.next[level]);
                if curr_ref.marked.load(Ordering::Acquire) {
                    // Covers the victim itself as well as any other marked
                    // node on the way.
                    let pred_ref = unsafe { pred.deref() };
                    match pred_ref.next[level].compare_exchange(
                        curr,
                        succ,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => {
                            if curr == node {
                                break;
                            }
                            curr = guard.shield(SLOT_CURR + level, succ);
                        }
                        Err(_) => {
                            curr = guard.protect(SLOT_CURR + level, &pred_ref.next[level]);
                        }
                    }
                    continue;
                }
                if unsafe { curr_ref.value() } <= key {
                    pred = guard.shield(SLOT_PRED + level, curr);
                    curr = guard.shield(SLOT_CURR + level, succ);
                } else {
                    // Past the key range: the node is gone from this level.
                    break;
                }
            }
        }
    }
}

impl<T> Default for PriorityQueue<T>
where
    T: Ord + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for PriorityQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the bottom level and free every remaining
        // node plus both sentinels. Nodes retired by `pop` belong to the
        // domain and are not on this chain anymore.
        let guard = enter(&self.domain);
        let mut node = self.head;
        while !node.is_null() {
            let next = unsafe { &*node }.next[0]
                .load(Ordering::Relaxed, &guard)
                .as_raw();
            unsafe { drop(Box::from_raw(node)) };
            node = if next == self.tail { ptr::null_mut() } else { next };
        }
        unsafe { drop(Box::from_raw(self.tail)) };
    }
}
