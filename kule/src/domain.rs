//! Hazard-slot registry and reclamation domain.
//!
//! A [`Domain`] owns a fixed array of per-thread slot bands plus the shared
//! retired list. Threads announce the pointers they are about to dereference
//! by publishing them into their band; [`Domain::scan`] compares retired
//! records against a snapshot of every published slot and frees the records
//! nobody references.

use crate::retired::{Retired, RetiredList};
use core::ptr;
use core::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};
use once_cell::race::OnceBox;
use std::sync::Arc;

/// Number of hazard slots in each per-thread band.
///
/// Sized for the deepest traversal shipped in this workspace: a full tower
/// walk of a 16-level index pins two nodes per level, plus one scratch slot
/// for the successor probe and one for an extraction candidate.
pub const SLOTS_PER_THREAD: usize = 36;

// Maximum concurrently registered threads. Configurable via cargo features:
//   kule = { features = ["max-threads-512"] }
// Default: 128.
#[cfg(feature = "max-threads-1024")]
pub(crate) const MAX_THREADS: usize = 1024;
#[cfg(all(feature = "max-threads-512", not(feature = "max-threads-1024")))]
pub(crate) const MAX_THREADS: usize = 512;
#[cfg(all(
    feature = "max-threads-256",
    not(any(feature = "max-threads-512", feature = "max-threads-1024"))
))]
pub(crate) const MAX_THREADS: usize = 256;
#[cfg(not(any(
    feature = "max-threads-256",
    feature = "max-threads-512",
    feature = "max-threads-1024"
)))]
pub(crate) const MAX_THREADS: usize = 128;

/// Floor for the scan trigger, so lightly-threaded processes still batch
/// retirements instead of scanning on every retire.
const SCAN_THRESHOLD_MIN: usize = 256;

// Band-ownership bitmap geometry: one bit per thread id.
const TID_WORD_BITS: usize = usize::BITS as usize;
const TID_WORDS: usize = (MAX_THREADS + TID_WORD_BITS - 1) / TID_WORD_BITS;

/// One thread's hazard slots. Band-aligned so two threads' announcements
/// never share a cache line.
#[repr(align(128))]
struct SlotBand {
    slots: [AtomicPtr<()>; SLOTS_PER_THREAD],
}

impl SlotBand {
    fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
        }
    }
}

/// A hazard-pointer reclamation domain.
///
/// Most embedders use the process-wide [`Domain::global`] instance; tests and
/// scoped embedders can construct their own with [`Domain::new`] and share it
/// behind an [`Arc`].
///
/// # Example
///
/// ```
/// use std::sync::atomic::Ordering;
/// use kule::{enter, Atomic, Domain, Shared};
///
/// let domain = Domain::global();
/// let atomic = Atomic::new(Box::into_raw(Box::new(42)));
///
/// let guard = enter(domain);
/// let ptr = guard.protect(0, &atomic);
/// unsafe { assert_eq!(*ptr.deref(), 42) };
///
/// // Unlink first, then retire.
/// let old = atomic.swap(Shared::null(), Ordering::AcqRel, &guard);
/// unsafe { domain.retire(old.as_raw()) };
/// ```
pub struct Domain {
    bands: Box<[SlotBand]>,
    retired: RetiredList,
    /// One bit per band, set while a thread owns it. Freed ids are reused
    /// lowest-first.
    tid_bitmap: [AtomicUsize; TID_WORDS],
    /// Upper bound on ever-allocated thread ids; bounds the scan.
    high_tid: AtomicUsize,
}

impl Domain {
    /// Create an empty domain with all slot bands unpublished.
    pub fn new() -> Self {
        let mut bands = Vec::with_capacity(MAX_THREADS);
        for _ in 0..MAX_THREADS {
            bands.push(SlotBand::new());
        }
        Self {
            bands: bands.into_boxed_slice(),
            retired: RetiredList::new(),
            tid_bitmap: core::array::from_fn(|_| AtomicUsize::new(0)),
            high_tid: AtomicUsize::new(0),
        }
    }

    /// The process-wide default domain. Initialized on first use and never
    /// torn down; the OS reclaims it at process exit.
    pub fn global() -> &'static Arc<Domain> {
        static GLOBAL: OnceBox<Arc<Domain>> = OnceBox::new();
        GLOBAL.get_or_init(|| Box::new(Arc::new(Domain::new())))
    }

    #[inline]
    pub(crate) fn slot(&self, tid: usize, index: usize) -> &AtomicPtr<()> {
        &self.bands[tid].slots[index]
    }

    /// Claim a free thread id: the lowest clear bit in the ownership
    /// bitmap.
    pub(crate) fn alloc_tid(&self) -> usize {
        for (word_idx, word) in self.tid_bitmap.iter().enumerate() {
            let mut bits = word.load(Ordering::Relaxed);
            loop {
                let bit = (!bits).trailing_zeros() as usize;
                if bit >= TID_WORD_BITS {
                    break;
                }
                let tid = word_idx * TID_WORD_BITS + bit;
                if tid >= MAX_THREADS {
                    break;
                }
                // Acquire pairs with the release in `free_tid`, so the
                // previous owner's slot clears are visible before reuse.
                match word.compare_exchange_weak(
                    bits,
                    bits | (1 << bit),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        self.high_tid.fetch_max(tid + 1, Ordering::AcqRel);
                        return tid;
                    }
                    Err(actual) => bits = actual,
                }
            }
        }
        panic!("kule: exceeded maximum thread count ({MAX_THREADS})");
    }

    /// Release a thread id. Clears the band first so a stale announcement
    /// can never pin a future retirement.
    pub(crate) fn free_tid(&self, tid: usize) {
        for slot in &self.bands[tid].slots {
            slot.store(ptr::null_mut(), Ordering::Release);
        }
        self.tid_bitmap[tid / TID_WORD_BITS]
            .fetch_and(!(1 << (tid % TID_WORD_BITS)), Ordering::Release);
    }

    /// Hand an unlinked allocation to the domain for deferred destruction.
    ///
    /// The record is appended under the spin lock; once the pending count
    /// reaches the scan threshold a [`scan`](Self::scan) runs on the calling
    /// thread.
    ///
    /// # Safety
    ///
    /// - `ptr` must originate from `Box::into_raw` and be retired at most
    ///   once.
    /// - `ptr` must be unreachable for new traversals: no shared cell that a
    ///   live thread could still protect-and-validate may point to it.
    pub unsafe fn retire<T: 'static>(&self, ptr: *mut T) {
        // SAFETY: forwarded to the caller.
        let pending = self.retired.push(unsafe { Retired::new(ptr) });
        if pending >= self.scan_threshold() {
            self.scan();
        }
    }

    /// Reclaim every retired record that no hazard slot references.
    ///
    /// Safe to run concurrently with `protect` on other threads and with
    /// other scans; each record is taken by exactly one scanner. Destructors
    /// run outside the lock.
    pub fn scan(&self) {
        let taken = self.retired.take();
        if taken.is_empty() {
            return;
        }

        // Pairs with the SeqCst publication in `HazardGuard::protect`: any
        // announcement made before a record became unreachable is visible
        // to the snapshot below.
        fence(Ordering::SeqCst);

        let high = self.high_tid.load(Ordering::Acquire).min(MAX_THREADS);
        let mut hazards: Vec<*mut ()> = Vec::with_capacity(high * 4);
        for band in &self.bands[..high] {
            for slot in &band.slots {
                let ptr = slot.load(Ordering::Acquire);
                if !ptr.is_null() {
                    hazards.push(ptr);
                }
            }
        }
        hazards.sort_unstable();

        let mut survivors = Vec::new();
        for record in taken {
            if hazards.binary_search(&record.address()).is_ok() {
                survivors.push(record);
            } else {
                // SAFETY: the record is unreachable (retire contract) and no
                // slot referenced it at the snapshot, so no thread holds or
                // can re-acquire a protected reference.
                unsafe { record.reclaim() }
            }
        }

        if !survivors.is_empty() {
            self.retired.put_back(survivors);
        }
    }

    /// Scan trigger: at least the number of hazard slots currently
    /// registered, with a floor so small processes still batch.
    fn scan_threshold(&self) -> usize {
        let slots = self.high_tid.load(Ordering::Relaxed).min(MAX_THREADS) * SLOTS_PER_THREAD;
        (slots * 2).max(SCAN_THRESHOLD_MIN)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        // Exclusive access: no guards can exist on a domain being dropped,
        // so every pending record is reclaimable.
        for record in self.retired.drain_exclusive() {
            unsafe { record.reclaim() }
        }
    }
}
