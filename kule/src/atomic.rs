//! Typed atomic pointers scoped to a hazard guard.
//!
//! [`Atomic<T>`] is the shared cell lock-free structures link through;
//! [`Shared<'g, T>`] is a pointer whose validity is tied to the guard that
//! produced it. Loading through `Atomic` never protects by itself; pin a
//! pointer with [`HazardGuard::protect`] before dereferencing anything
//! another thread may retire.

use crate::guard::HazardGuard;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// An atomic pointer to a heap-allocated `T`, mutated with CAS by writers
/// and read under guard protection by traversals.
pub struct Atomic<T> {
    data: AtomicPtr<T>,
}

unsafe impl<T: Send + Sync> Send for Atomic<T> {}
unsafe impl<T: Send + Sync> Sync for Atomic<T> {}

impl<T> Atomic<T> {
    /// Create an atomic pointer holding `ptr`.
    #[inline]
    pub fn new(ptr: *mut T) -> Self {
        Self {
            data: AtomicPtr::new(ptr),
        }
    }

    /// Create a null atomic pointer.
    #[inline]
    pub fn null() -> Self {
        Self::new(ptr::null_mut())
    }

    /// Raw load used by the protect loop and by exclusive-access paths.
    #[inline]
    pub(crate) fn load_raw(&self, order: Ordering) -> *mut T {
        self.data.load(order)
    }

    /// Load the current pointer.
    ///
    /// This is a plain atomic read: it does not announce the pointer. The
    /// result may only be dereferenced if it is already pinned by one of the
    /// guard's slots or is otherwise never reclaimed (e.g. a sentinel).
    #[inline]
    pub fn load<'g>(&self, order: Ordering, _guard: &'g HazardGuard) -> Shared<'g, T> {
        Shared {
            data: self.data.load(order),
            _marker: PhantomData,
        }
    }

    /// Store a pointer.
    #[inline]
    pub fn store(&self, ptr: Shared<'_, T>, order: Ordering) {
        self.data.store(ptr.data, order);
    }

    /// Compare-and-exchange the pointer.
    #[inline]
    pub fn compare_exchange<'g>(
        &self,
        current: Shared<'_, T>,
        new: Shared<'_, T>,
        success: Ordering,
        failure: Ordering,
        _guard: &'g HazardGuard,
    ) -> Result<Shared<'g, T>, Shared<'g, T>> {
        match self
            .data
            .compare_exchange(current.data, new.data, success, failure)
        {
            Ok(prev) => Ok(Shared {
                data: prev,
                _marker: PhantomData,
            }),
            Err(prev) => Err(Shared {
                data: prev,
                _marker: PhantomData,
            }),
        }
    }

    /// Compare-and-exchange, allowed to fail spuriously.
    #[inline]
    pub fn compare_exchange_weak<'g>(
        &self,
        current: Shared<'_, T>,
        new: Shared<'_, T>,
        success: Ordering,
        failure: Ordering,
        _guard: &'g HazardGuard,
    ) -> Result<Shared<'g, T>, Shared<'g, T>> {
        match self
            .data
            .compare_exchange_weak(current.data, new.data, success, failure)
        {
            Ok(prev) => Ok(Shared {
                data: prev,
                _marker: PhantomData,
            }),
            Err(prev) => Err(Shared {
                data: prev,
                _marker: PhantomData,
            }),
        }
    }

    /// Swap the pointer, returning the previous value.
    #[inline]
    pub fn swap<'g>(&self, new: Shared<'_, T>, order: Ordering, _guard: &'g HazardGuard) -> Shared<'g, T> {
        Shared {
            data: self.data.swap(new.data, order),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Atomic<T> {
    fn default() -> Self {
        Self::null()
    }
}

/// A pointer bound to the lifetime of the guard that produced it.
///
/// Dereferencing requires that the pointer is pinned by one of the guard's
/// slots (see [`HazardGuard::protect`]) or is never reclaimed.
pub struct Shared<'g, T> {
    data: *mut T,
    _marker: PhantomData<(&'g HazardGuard, *mut T)>,
}

impl<'g, T> Shared<'g, T> {
    /// A null shared pointer.
    #[inline]
    pub fn null() -> Self {
        Self {
            data: ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Wrap a raw pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure the pointer stays valid for the lifetime `'g`
    /// wherever it is dereferenced.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            data: ptr,
            _marker: PhantomData,
        }
    }

    /// The raw pointer.
    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.data
    }

    /// True if the pointer is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Convert to an optional reference.
    ///
    /// # Safety
    ///
    /// The pointer must be pinned (or never reclaimed) and point to a valid
    /// `T` for `'g`.
    #[inline]
    pub unsafe fn as_ref(&self) -> Option<&'g T> {
        if self.is_null() {
            None
        } else {
            // SAFETY: caller guarantees validity for 'g.
            unsafe { Some(&*self.data) }
        }
    }

    /// Convert to a reference without the null check.
    ///
    /// # Safety
    ///
    /// As [`as_ref`](Self::as_ref), and the pointer must be non-null.
    #[inline]
    pub unsafe fn deref(&self) -> &'g T {
        // SAFETY: caller guarantees a valid, non-null pointer for 'g.
        unsafe { &*self.data }
    }
}

impl<'g, T> Clone for Shared<'g, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'g, T> Copy for Shared<'g, T> {}

impl<'g, T> PartialEq for Shared<'g, T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<'g, T> Eq for Shared<'g, T> {}

impl<'g, T> core::fmt::Debug for Shared<'g, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Shared({:p})", self.data)
    }
}
