//! Kule: hazard-pointer memory reclamation for lock-free data structures.
//! Bounded garbage, wait-free announcements, no read-side locks.
//!
//! Kule implements classic hazard pointers with a slot-band architecture:
//! every registered thread owns a fixed band of single-writer announcement
//! cells, and retired allocations are only freed once a scan proves no band
//! references them.
//!
//! # Key Features
//!
//! - **Wait-Free Announcement**: publishing a hazard is a store plus a
//!   validating re-read
//! - **Bounded Garbage**: unreclaimed memory is O(threads × batch)
//! - **Slot-Band Architecture**: fixed per-thread bands, recycled on thread
//!   exit
//! - **Injectable Domains**: a process-wide default plus scoped domains for
//!   tests and embedders
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::Ordering;
//! use kule::{enter, Atomic, Domain, Shared};
//!
//! let domain = Domain::global();
//! let atomic = Atomic::new(Box::into_raw(Box::new(42)));
//!
//! // Enter a critical section and pin the pointer in slot 0.
//! let guard = enter(domain);
//! let ptr = guard.protect(0, &atomic);
//! unsafe {
//!     assert_eq!(*ptr.deref(), 42);
//! }
//!
//! // Unlink, then hand the allocation to the domain. It is freed by a
//! // later scan, once no slot announces it.
//! let old = atomic.swap(Shared::null(), Ordering::AcqRel, &guard);
//! unsafe { domain.retire(old.as_raw()) };
//! drop(guard);
//! ```

#![warn(missing_docs)]

mod atomic;
mod domain;
mod guard;
mod retired;

pub use atomic::{Atomic, Shared};
pub use domain::{Domain, SLOTS_PER_THREAD};
pub use guard::{enter, HazardGuard};

// Re-export for convenience
pub use core::sync::atomic::Ordering;
