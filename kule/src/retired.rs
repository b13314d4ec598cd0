//! Retired records awaiting reclamation.
//!
//! A retired record is a `(pointer, destructor)` pair. The destructor is a
//! type-erased function pointer produced by monomorphizing [`Retired::new`]
//! over the concrete pointee type, so the domain can hold records of mixed
//! types in a single list and still run the right `Drop` code for each.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Type-erased destructor invoked exactly once when a record is reclaimed.
pub(crate) type DestructorFn = unsafe fn(*mut ());

/// A single retired allocation, queued in the domain until no hazard slot
/// references it.
pub(crate) struct Retired {
    ptr: *mut (),
    destructor: DestructorFn,
}

// SAFETY: a retired record is an exclusively-owned pointer plus a function
// pointer; ownership moves with the record.
unsafe impl Send for Retired {}

impl Retired {
    /// Build a record for `ptr`, capturing a destructor that frees it as a
    /// `Box<T>`.
    ///
    /// # Safety
    ///
    /// `ptr` must originate from `Box::into_raw` and must not be retired
    /// more than once.
    pub(crate) unsafe fn new<T: 'static>(ptr: *mut T) -> Self {
        unsafe fn drop_box<T>(ptr: *mut ()) {
            // SAFETY: `ptr` was created by `Box::into_raw::<T>` and this
            // destructor runs at most once per record.
            unsafe { drop(Box::from_raw(ptr as *mut T)) }
        }
        Self {
            ptr: ptr as *mut (),
            destructor: drop_box::<T>,
        }
    }

    /// Address compared against the hazard-slot snapshot during a scan.
    #[inline]
    pub(crate) fn address(&self) -> *mut () {
        self.ptr
    }

    /// Run the destructor, consuming the record.
    ///
    /// # Safety
    ///
    /// No hazard slot may reference [`address`](Self::address) and no thread
    /// may dereference it after this call.
    pub(crate) unsafe fn reclaim(self) {
        // SAFETY: forwarded to the caller.
        unsafe { (self.destructor)(self.ptr) }
    }
}

/// The domain's pending retirements, serialized by a lock bit.
///
/// The bit covers only `Vec` bookkeeping. A scan empties the list with
/// [`take`](Self::take), filters it with no lock held, and hands the
/// survivors back through [`put_back`](Self::put_back), so destructors
/// never run inside the critical section and concurrent scanners each own
/// a disjoint set of records.
pub(crate) struct RetiredList {
    locked: AtomicBool,
    records: UnsafeCell<Vec<Retired>>,
}

// SAFETY: `records` is only touched while `locked` is held (or through
// `&mut self`), and `Retired` is `Send`.
unsafe impl Send for RetiredList {}
unsafe impl Sync for RetiredList {}

impl RetiredList {
    pub(crate) const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            records: UnsafeCell::new(Vec::new()),
        }
    }

    fn acquire(&self) {
        while self.locked.swap(true, Ordering::Acquire) {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Append a record and report how many are pending, so the caller can
    /// decide whether to trigger a scan.
    pub(crate) fn push(&self, record: Retired) -> usize {
        self.acquire();
        // SAFETY: the lock bit serializes access to `records`.
        let records = unsafe { &mut *self.records.get() };
        records.push(record);
        let pending = records.len();
        self.release();
        pending
    }

    /// Take every pending record, leaving the list empty.
    pub(crate) fn take(&self) -> Vec<Retired> {
        self.acquire();
        // SAFETY: the lock bit serializes access to `records`.
        let records = unsafe { &mut *self.records.get() };
        let taken = core::mem::take(records);
        self.release();
        taken
    }

    /// Return records a scan could not reclaim.
    pub(crate) fn put_back(&self, mut survivors: Vec<Retired>) {
        self.acquire();
        // SAFETY: the lock bit serializes access to `records`.
        let records = unsafe { &mut *self.records.get() };
        records.append(&mut survivors);
        self.release();
    }

    /// Empty the list without locking. Usable where `&mut self` proves no
    /// other thread can touch it (the domain's drop).
    pub(crate) fn drain_exclusive(&mut self) -> Vec<Retired> {
        core::mem::take(self.records.get_mut())
    }
}
