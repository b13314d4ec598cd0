//! Priority primitives for Kule.
//!
//! ## Features
//!
//! - `PriorityQueue`: Unbounded MPMC min-priority queue backed by a
//!   lock-free skip list. Producers and consumers on distant keys do not
//!   contend; logically deleted nodes are reclaimed through a
//!   [`kule::Domain`].
//!
//! ## Usage
//!
//! ```rust
//! use kule_pq::PriorityQueue;
//!
//! let pq = PriorityQueue::new();
//! for v in [3u64, 1, 4, 1, 5] {
//!     pq.push(v);
//! }
//! assert_eq!(pq.pop(), Some(1));
//! assert_eq!(pq.pop(), Some(1));
//! assert_eq!(pq.pop(), Some(3));
//! ```

mod node;
pub mod pq;

pub use pq::PriorityQueue;
