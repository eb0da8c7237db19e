//! The one fatal error this crate can produce.
//!
//! Normal outcomes (`add`/`remove`/`contains` not finding or already
//! finding a value) are not errors — they are `bool` results. The only
//! unrecoverable condition the core defines is slab exhaustion: the
//! lock-free set's node pool has a fixed, monotonically-growing capacity
//! (`MEM_BLOCK_SIZE * MEM_BLOCK_CNT` nodes per set) and once every slot is
//! claimed there is nowhere left to allocate a new node.
//!
//! The public `add`/`remove` API does not surface this as a `Result`: the
//! abstract spec treats out-of-memory as an unrecoverable condition where
//! "the implementation may abort" is acceptable, and forcing every caller
//! to handle a `Result` for a condition unreachable at the default 500
//! million node capacity would be the wrong default. [`SlabExhausted`]
//! still exists, with a real [`std::error::Error`] impl, for the
//! lower-level [`crate::slab::Slab`] type, which a caller constructing a
//! custom-capacity pool (see [`crate::lock_free::LockFreeSet::with_block_layout`])
//! may want to pre-flight.

use std::fmt;

/// The lock-free set's node pool has been fully claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabExhausted {
    /// Total node capacity (`block_size * block_count`) that was exceeded.
    pub capacity: usize,
}

impl fmt::Display for SlabExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slab allocator exhausted: all {} node slots are claimed",
            self.capacity
        )
    }
}

impl std::error::Error for SlabExhausted {}
