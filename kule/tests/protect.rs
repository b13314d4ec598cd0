//! Announcement semantics.
//!
//! Validates that a pointer published in a hazard slot survives scans until
//! the slot is cleared, that protection transfers between slots, and that
//! nested guards do not alias each other's bands. All tests run against a
//! scoped domain so reclamation is observable deterministically.

use kule::{enter, Atomic, Domain, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountedNode {
    value: u64,
    drops: Arc<AtomicUsize>,
}

impl CountedNode {
    fn new(value: u64, drops: &Arc<AtomicUsize>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value,
            drops: drops.clone(),
        }))
    }
}

impl Drop for CountedNode {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn protected_pointer_survives_scan() {
    let domain = Arc::new(Domain::new());
    let drops = Arc::new(AtomicUsize::new(0));
    let atomic = Atomic::new(CountedNode::new(7, &drops));

    let guard = enter(&domain);
    let ptr = guard.protect(0, &atomic);
    unsafe { assert_eq!(ptr.deref().value, 7) };

    // Unlink, retire, and force a scan while the announcement stands.
    let old = atomic.swap(Shared::null(), Ordering::AcqRel, &guard);
    unsafe { domain.retire(old.as_raw()) };
    domain.scan();
    assert_eq!(drops.load(Ordering::SeqCst), 0, "pinned node was freed");

    drop(guard);
    domain.scan();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn shield_transfers_protection_between_slots() {
    let domain = Arc::new(Domain::new());
    let drops = Arc::new(AtomicUsize::new(0));
    let atomic = Atomic::new(CountedNode::new(11, &drops));

    let guard = enter(&domain);
    let ptr = guard.protect(0, &atomic);
    let moved = guard.shield(1, ptr);
    guard.clear(0);

    let old = atomic.swap(Shared::null(), Ordering::AcqRel, &guard);
    unsafe { domain.retire(old.as_raw()) };
    domain.scan();
    assert_eq!(drops.load(Ordering::SeqCst), 0, "slot 1 no longer pins");
    unsafe { assert_eq!(moved.deref().value, 11) };

    guard.clear(1);
    domain.scan();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn protect_tracks_the_cell() {
    let domain = Arc::new(Domain::new());
    let drops = Arc::new(AtomicUsize::new(0));
    let atomic = Atomic::new(CountedNode::new(1, &drops));

    let guard = enter(&domain);
    let first = guard.protect(0, &atomic);
    unsafe { assert_eq!(first.deref().value, 1) };

    // Replace the cell, then protect again: the loop must return the
    // current pointer, not the stale one.
    let replacement = CountedNode::new(2, &drops);
    let old = atomic.swap(
        unsafe { Shared::from_raw(replacement) },
        Ordering::AcqRel,
        &guard,
    );
    unsafe { domain.retire(old.as_raw()) };

    let second = guard.protect(1, &atomic);
    unsafe { assert_eq!(second.deref().value, 2) };

    drop(guard);
    let guard = enter(&domain);
    let last = atomic.swap(Shared::null(), Ordering::AcqRel, &guard);
    unsafe { domain.retire(last.as_raw()) };
    drop(guard);
    domain.scan();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn nested_guards_use_distinct_bands() {
    let domain = Arc::new(Domain::new());
    let drops = Arc::new(AtomicUsize::new(0));
    let outer_atomic = Atomic::new(CountedNode::new(1, &drops));
    let inner_atomic = Atomic::new(CountedNode::new(2, &drops));

    let outer = enter(&domain);
    let outer_ptr = outer.protect(0, &outer_atomic);

    {
        // Same slot index on a nested guard must not clobber the outer
        // announcement.
        let inner = enter(&domain);
        let inner_ptr = inner.protect(0, &inner_atomic);
        unsafe { assert_eq!(inner_ptr.deref().value, 2) };

        let old = inner_atomic.swap(Shared::null(), Ordering::AcqRel, &inner);
        unsafe { domain.retire(old.as_raw()) };
        domain.scan();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    // Inner guard dropped; its node is reclaimable, the outer one is not.
    let old = outer_atomic.swap(Shared::null(), Ordering::AcqRel, &outer);
    unsafe { domain.retire(old.as_raw()) };
    domain.scan();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    unsafe { assert_eq!(outer_ptr.deref().value, 1) };

    drop(outer);
    domain.scan();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}
