//! Two-level slab allocator for lock-free set nodes.
//!
//! A flat `Vec<Node>` cannot be grown without invalidating pointers held by
//! concurrent readers, and a `Mutex`-guarded allocator would reintroduce
//! the very lock this variant exists to avoid. Instead, the pool is an
//! array of fixed-size blocks: a block is allocated, once, the first time
//! some thread's bump index lands inside it, via a single CAS on that
//! block's slot. Every node handed out is a raw pointer into a block that
//! is never moved or freed until the whole set is dropped — so a pointer
//! handed to a caller stays valid for as long as the owning `LockFreeSet`
//! does, even after the node is logically deleted.
//!
//! Ported from the `mem`/`memptr` bookkeeping in
//! `original_source/src/linkedlist/linkedlist.c`'s `list_new`/`list_add`.

use std::ptr;

use crate::atomic;
use crate::atomic::{AtomicU32, Ordering};
use crate::error::SlabExhausted;
use crate::lock_free::Node;

#[cfg(loom)]
use loom::sync::atomic::AtomicPtr;
#[cfg(not(loom))]
use std::sync::atomic::AtomicPtr;

/// A bump-allocated pool of `Node`s, organized as `block_count` blocks of
/// `block_size` nodes each.
pub(crate) struct Slab {
    blocks: Box<[AtomicPtr<Node>]>,
    memptr: AtomicU32,
    block_size: usize,
}

impl Slab {
    /// Creates a pool with the given layout and eagerly allocates block 0,
    /// matching the spec's `list_new` ("allocate block 0 of
    /// `MEM_BLOCK_SIZE` nodes" up front; every other block is lazy).
    pub(crate) fn new(block_size: usize, block_count: usize) -> Self {
        assert!(block_size > 0 && block_count > 0, "slab layout must be non-empty");
        let blocks: Box<[AtomicPtr<Node>]> = (0..block_count)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        let first_block = Self::fresh_block(block_size);
        // No concurrent access is possible yet: `self` has not been handed
        // to anyone.
        blocks[0].store(first_block, Ordering::Relaxed);

        Self {
            blocks,
            memptr: AtomicU32::new(0),
            block_size,
        }
    }

    fn fresh_block(block_size: usize) -> *mut Node {
        let boxed: Box<[Node]> = (0..block_size).map(|_| Node::blank()).collect();
        // A boxed slice's raw pointer is a fat pointer; casting to `*mut
        // Node` keeps only the address of the first element. The length is
        // reconstructed from `block_size` (a `Slab`-wide constant) when the
        // block is freed in `Drop`.
        Box::into_raw(boxed) as *mut Node
    }

    /// Claims the next slot in the pool.
    ///
    /// Returns [`SlabExhausted`] once every block's capacity
    /// (`block_size * blocks.len()`) has been claimed.
    pub(crate) fn alloc(&self) -> Result<*mut Node, SlabExhausted> {
        let idx = atomic::fai(&self.memptr) as usize;
        let block_id = idx / self.block_size;
        if block_id >= self.blocks.len() {
            return Err(SlabExhausted {
                capacity: self.block_size * self.blocks.len(),
            });
        }
        let slot = idx % self.block_size;

        let mut block_ptr = self.blocks[block_id].load(Ordering::Acquire);
        if block_ptr.is_null() {
            let candidate = Self::fresh_block(self.block_size);
            match self.blocks[block_id].compare_exchange(
                ptr::null_mut(),
                candidate,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => block_ptr = candidate,
                Err(observed) => {
                    // Lost the race to initialize this block: free our
                    // redundant allocation and use the winner's.
                    // SAFETY: `candidate` was just allocated by this
                    // thread and published to no one, since the CAS that
                    // would have published it failed.
                    unsafe {
                        drop(Box::from_raw(std::slice::from_raw_parts_mut(
                            candidate,
                            self.block_size,
                        )));
                    }
                    block_ptr = observed;
                }
            }
        }

        // SAFETY: `block_ptr` is non-null (just ensured above) and was
        // allocated with `self.block_size` elements; `slot < self.block_size`.
        Ok(unsafe { block_ptr.add(slot) })
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        for block in self.blocks.iter() {
            let ptr = block.load(Ordering::Relaxed);
            if !ptr.is_null() {
                // SAFETY: every non-null block pointer was produced by
                // `fresh_block(self.block_size)`, so reconstructing a
                // `Box<[Node]>` with that same length is exactly undoing
                // the earlier `Box::into_raw`. `&mut self` guarantees no
                // other thread still holds a reference into this pool.
                unsafe {
                    drop(Box::from_raw(std::slice::from_raw_parts_mut(
                        ptr,
                        self.block_size,
                    )));
                }
            }
        }
    }
}
