//! Concurrent sorted integer sets, implemented two ways.
//!
//! This crate provides the same abstract datatype — a concurrent sorted
//! set of `i64` values, stored as a singly linked list bracketed by
//! `i64::MIN`/`i64::MAX` sentinels — under two independent synchronization
//! strategies:
//!
//! - [`lock_based::LockBasedSet`]: fine-grained per-node ticket locks,
//!   acquired hand-over-hand while traversing the list.
//! - [`lock_free::LockFreeSet`]: a Harris-style lock-free list, using a
//!   mark bit stolen from the next-pointer's low bit for logical deletion
//!   and a bump-allocated slab for node storage.
//!
//! Both expose the same three operations — `contains`, `add`, `remove` —
//! plus `len` and automatic teardown on `Drop`. Neither type implements
//! range queries, iteration, or generic keys/values: this is an unordered
//! *set* from the caller's point of view, even though the list itself is
//! kept sorted internally to make the operations efficient and the
//! invariants checkable.
//!
//! ## Which one to use
//!
//! The lock-based variant is simpler to reason about and has no fixed
//! capacity. The lock-free variant avoids blocking entirely (progress is
//! guaranteed system-wide, though not per-thread) at the cost of a
//! monotonically growing, capacity-bounded node pool — see
//! [`lock_free::LockFreeSet::DEFAULT_BLOCK_COUNT`].
//!
//! ## Module layout
//!
//! - [`atomic`] — the four atomic primitives (`fai`, `cas`, `pause`,
//!   `release_fence`) every other module is built from.
//! - [`ticket`] — the FIFO ticket lock used by [`lock_based`].
//! - [`slab`] — the two-level bump allocator used by [`lock_free`].
//! - [`error`] — the one fatal error this crate defines (slab exhaustion).

pub mod atomic;
pub mod error;
pub mod lock_based;
pub mod lock_free;
pub(crate) mod slab;
pub mod ticket;

pub use lock_based::LockBasedSet;
pub use lock_free::LockFreeSet;
