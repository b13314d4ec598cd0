//! Thread registration and the RAII hazard guard.
//!
//! Each thread lazily registers with a domain to obtain a slot band, cached
//! in a thread-local handle and recycled when the thread exits. Entering a
//! domain activates the band and returns a [`HazardGuard`]; the guard's
//! `protect` publishes announcements into the band and its drop retracts
//! them.

use crate::atomic::{Atomic, Shared};
use crate::domain::Domain;
use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{fence, Ordering};
use std::sync::Arc;

/// One thread's claim on a slot band of one domain.
struct Registration {
    domain: Arc<Domain>,
    tid: usize,
    /// Whether a guard currently owns the band.
    active: Cell<bool>,
}

/// Thread-local registry of slot bands, one entry per domain the thread has
/// entered. Dropped on thread exit, returning every band to its domain.
struct Handle {
    regs: RefCell<Vec<Registration>>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            regs: RefCell::new(Vec::new()),
        }
    }

    fn enter(&self, domain: &Arc<Domain>) -> HazardGuard {
        let mut regs = self.regs.borrow_mut();

        // Prune registrations whose domain is referenced by nobody else.
        // Releasing the band and the Arc here lets a scoped domain drop (and
        // drain its retired list) without waiting for thread exit.
        regs.retain(|reg| {
            if reg.active.get() || Arc::strong_count(&reg.domain) > 1 {
                true
            } else {
                reg.domain.free_tid(reg.tid);
                false
            }
        });

        if let Some(reg) = regs.iter().find(|reg| Arc::ptr_eq(&reg.domain, domain)) {
            if !reg.active.get() {
                reg.active.set(true);
                return HazardGuard::new(Arc::clone(domain), reg.tid, false);
            }
            // Nested critical section on the same domain. Slots are directly
            // indexed, so a nested guard must not alias the outer band; it
            // takes a throwaway band instead.
            return ephemeral(domain);
        }

        let tid = domain.alloc_tid();
        regs.push(Registration {
            domain: Arc::clone(domain),
            tid,
            active: Cell::new(true),
        });
        HazardGuard::new(Arc::clone(domain), tid, false)
    }

    fn release(&self, domain: &Arc<Domain>, tid: usize) {
        let regs = self.regs.borrow();
        if let Some(reg) = regs
            .iter()
            .find(|reg| reg.tid == tid && Arc::ptr_eq(&reg.domain, domain))
        {
            reg.active.set(false);
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        for reg in self.regs.get_mut().drain(..) {
            reg.domain.free_tid(reg.tid);
        }
    }
}

thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Band acquisition that bypasses the thread-local cache: used for nested
/// guards and when TLS is already torn down.
fn ephemeral(domain: &Arc<Domain>) -> HazardGuard {
    let tid = domain.alloc_tid();
    HazardGuard::new(Arc::clone(domain), tid, true)
}

/// Enter a critical section on `domain`.
///
/// Returns a [`HazardGuard`] owning the calling thread's slot band for that
/// domain. While the guard lives, any pointer it publishes via
/// [`protect`](HazardGuard::protect) cannot be reclaimed. The band is cached
/// in thread-local state and recycled when the thread exits.
pub fn enter(domain: &Arc<Domain>) -> HazardGuard {
    // During process teardown TLS may be destroyed; fall back to a
    // throwaway band rather than panicking in a destructor.
    HANDLE
        .try_with(|handle| handle.enter(domain))
        .unwrap_or_else(|_| ephemeral(domain))
}

/// RAII critical section over one domain's slot band.
///
/// While the guard lives, every pointer published through
/// [`protect`](Self::protect) or [`shield`](Self::shield) is pinned: a
/// concurrent [`Domain::scan`] will not reclaim it. Dropping the guard
/// retracts all announcements.
///
/// Slot indices are chosen by the caller and must stay below
/// [`SLOTS_PER_THREAD`](crate::SLOTS_PER_THREAD); each index is a
/// single-writer cell owned by this guard.
pub struct HazardGuard {
    domain: Arc<Domain>,
    tid: usize,
    /// One past the highest slot index published, so drop only clears what
    /// was used.
    hwm: Cell<usize>,
    /// Frees the tid on drop instead of deactivating a cached registration.
    ephemeral: bool,
    /// Band ownership is tied to the entering thread.
    _not_send: PhantomData<*mut ()>,
}

impl HazardGuard {
    fn new(domain: Arc<Domain>, tid: usize, ephemeral: bool) -> Self {
        Self {
            domain,
            tid,
            hwm: Cell::new(0),
            ephemeral,
            _not_send: PhantomData,
        }
    }

    /// Read `src`, publish the pointer into slot `index`, and re-read until
    /// two successive reads agree.
    ///
    /// On return the announced pointer cannot be reclaimed until the slot is
    /// cleared, overwritten, or the guard drops. The caller must still
    /// confirm the pointer is the one it intends to use (e.g. the CAS it
    /// feeds the pointer into re-validates it).
    pub fn protect<'g, T>(&'g self, index: usize, src: &Atomic<T>) -> Shared<'g, T> {
        let slot = self.domain.slot(self.tid, index);
        self.note(index);
        let mut ptr = src.load_raw(Ordering::Acquire);
        loop {
            slot.store(ptr as *mut (), Ordering::SeqCst);
            // Announcement must be ordered before the validating re-read;
            // pairs with the fence in `Domain::scan`.
            fence(Ordering::SeqCst);
            let again = src.load_raw(Ordering::Acquire);
            if again == ptr {
                // SAFETY: `ptr` is announced and was still reachable through
                // `src` after the announcement, so it cannot pass a scan.
                return unsafe { Shared::from_raw(ptr) };
            }
            ptr = again;
        }
    }

    /// Publish an already-protected pointer into slot `index`.
    ///
    /// No validation loop: the pointer is covered by another slot of this
    /// guard (or is immortal), so a single store suffices. Used to keep a
    /// pointer pinned while the slot that discovered it moves on.
    pub fn shield<'g, T>(&'g self, index: usize, ptr: Shared<'_, T>) -> Shared<'g, T> {
        let slot = self.domain.slot(self.tid, index);
        self.note(index);
        slot.store(ptr.as_raw() as *mut (), Ordering::SeqCst);
        // SAFETY: protection is continuous: the source slot still covers
        // the pointer at the time of this store.
        unsafe { Shared::from_raw(ptr.as_raw()) }
    }

    /// Retract the announcement in slot `index`.
    pub fn clear(&self, index: usize) {
        self.domain
            .slot(self.tid, index)
            .store(ptr::null_mut(), Ordering::Release);
    }

    #[inline]
    fn note(&self, index: usize) {
        if index >= self.hwm.get() {
            self.hwm.set(index + 1);
        }
    }
}

impl Drop for HazardGuard {
    fn drop(&mut self) {
        for index in 0..self.hwm.get() {
            self.domain
                .slot(self.tid, index)
                .store(ptr::null_mut(), Ordering::Release);
        }
        if self.ephemeral {
            self.domain.free_tid(self.tid);
        } else {
            // TLS may already be gone during thread teardown; the handle's
            // own drop has then returned the band already.
            let _ = HANDLE.try_with(|handle| handle.release(&self.domain, self.tid));
        }
    }
}
