//! Skip-list node and tower-height generation.

use core::cell::RefCell;
use core::mem::MaybeUninit;
use core::sync::atomic::AtomicBool;
use kule::Atomic;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Tallest tower in the index. Level 0 is the sorted sequence of live
/// entries; higher levels are express lanes.
pub(crate) const MAX_LEVEL: usize = 16;

/// Probability of growing a tower by one more level; expected height ≈ 2.
const PROBABILITY: f64 = 0.5;

pub(crate) struct Node<T> {
    /// Uninitialized for the two sentinels, initialized for every entry.
    /// An extracted entry keeps its value until the node is reclaimed, so
    /// concurrent traversals can still order themselves against it.
    value: MaybeUninit<T>,
    /// Highest level this node participates in. Immutable after
    /// construction.
    pub(crate) top_level: usize,
    sentinel: bool,
    /// Set exactly once by the winning extractor; irreversible.
    pub(crate) marked: AtomicBool,
    /// Published with release semantics after the whole tower is spliced in;
    /// consumers treat the node as invisible until then.
    pub(crate) fully_linked: AtomicBool,
    pub(crate) next: [Atomic<Node<T>>; MAX_LEVEL + 1],
}

impl<T> Node<T> {
    /// A head or tail sentinel: no value, full-height tower, never marked.
    pub(crate) fn sentinel() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            top_level: MAX_LEVEL,
            sentinel: true,
            marked: AtomicBool::new(false),
            fully_linked: AtomicBool::new(true),
            next: core::array::from_fn(|_| Atomic::null()),
        }
    }

    pub(crate) fn with_value(value: T, top_level: usize) -> Self {
        Self {
            value: MaybeUninit::new(value),
            top_level,
            sentinel: false,
            marked: AtomicBool::new(false),
            fully_linked: AtomicBool::new(false),
            next: core::array::from_fn(|_| Atomic::null()),
        }
    }

    /// The stored entry.
    ///
    /// # Safety
    ///
    /// Must not be called on a sentinel. Valid on every other node until it
    /// is reclaimed, extracted or not.
    #[inline]
    pub(crate) unsafe fn value(&self) -> &T {
        // SAFETY: non-sentinel nodes are constructed with an initialized
        // value that is only dropped by `Drop` below.
        unsafe { self.value.assume_init_ref() }
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        if !self.sentinel {
            // SAFETY: exclusive access; the value was initialized at
            // construction and extraction clones rather than moves.
            unsafe { self.value.assume_init_drop() }
        }
    }
}

thread_local! {
    // Seeded on first use in a thread, destroyed with the thread.
    static LEVEL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

/// Flip a biased coin until failure, capped at [`MAX_LEVEL`]. No
/// cross-thread coordination.
pub(crate) fn random_level() -> usize {
    LEVEL_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        let mut level = 0;
        while level < MAX_LEVEL && rng.gen_bool(PROBABILITY) {
            level += 1;
        }
        level
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_respects_ceiling() {
        for _ in 0..10_000 {
            assert!(random_level() <= MAX_LEVEL);
        }
    }

    #[test]
    fn levels_are_geometric() {
        let mut ground = 0usize;
        for _ in 0..10_000 {
            if random_level() == 0 {
                ground += 1;
            }
        }
        // p = 0.5: roughly half of all towers stay at level 0.
        assert!(ground > 3_000 && ground < 7_000, "ground floor count {ground}");
    }
}
