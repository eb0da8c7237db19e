//! Lock-free sorted set (Harris-style mark-and-sweep).
//!
//! Deletion is logical first: a node is "removed" by CAS-setting the
//! low-order bit of its own `next` pointer. Readers and writers alike
//! treat a marked node as gone but may still walk through it; [`search`]
//! opportunistically splices out whole runs of marked nodes it encounters,
//! so physical unlinking happens lazily, amortized across whoever
//! traverses the list next.
//!
//! Ported from `original_source/src/linkedlist/linkedlist.c`. Node storage
//! comes from [`crate::slab`], a bump-allocated pool: logically deleted
//! nodes are never individually freed, only reclaimed in bulk when the set
//! itself is dropped (see module docs on `slab`).
//!
//! [`search`]: LockFreeSet::search

use std::ptr;

use crate::atomic;
use crate::atomic::{AtomicUsize, Ordering};
use crate::slab::Slab;

/// A node in the lock-free list.
///
/// `next` is a tagged pointer: the address of the next `Node`, OR'd with a
/// low bit that marks this node as logically deleted. Stored as
/// `AtomicUsize` rather than `AtomicPtr<Node>` so mark-bit arithmetic is
/// ordinary integer masking instead of pointer casts at every access.
/// Stealing the low bit is sound because `Node` contains an `i64` and is
/// therefore always at least 8-byte aligned.
pub(crate) struct Node {
    pub(crate) value: i64,
    pub(crate) next: AtomicUsize,
}

impl Node {
    pub(crate) const fn blank() -> Self {
        Self {
            value: 0,
            next: AtomicUsize::new(0),
        }
    }
}

#[inline]
fn is_marked(word: usize) -> bool {
    word & 1 != 0
}

#[inline]
fn with_mark(word: usize) -> usize {
    word | 1
}

#[inline]
fn without_mark(word: usize) -> usize {
    word & !1
}

#[inline]
fn raw(word: usize) -> *mut Node {
    without_mark(word) as *mut Node
}

/// A concurrent sorted set of `i64` backed by a Harris-style lock-free
/// singly linked list with a bump-allocated node pool.
pub struct LockFreeSet {
    head: *mut Node,
    tail: *mut Node,
    slab: Slab,
}

// SAFETY: every mutable field is either an atomic word or owned exclusively
// via the slab/sentinel allocation discipline described in the module docs.
unsafe impl Send for LockFreeSet {}
unsafe impl Sync for LockFreeSet {}

impl LockFreeSet {
    /// Node count per slab block, matching the abstract spec's
    /// `MEM_BLOCK_SIZE` default (16MB per block at `size_of::<Node>() == 16`).
    pub const DEFAULT_BLOCK_SIZE: usize = 1_000_000;

    /// Number of blocks in the slab, matching the abstract spec's
    /// `MEM_BLOCK_CNT` default (caps a set at 500M nodes).
    pub const DEFAULT_BLOCK_COUNT: usize = 500;

    /// Creates a new, empty set using the spec's default slab layout
    /// (500 blocks of 1,000,000 nodes each).
    pub fn new() -> Self {
        Self::with_block_layout(Self::DEFAULT_BLOCK_SIZE, Self::DEFAULT_BLOCK_COUNT)
    }

    /// Creates a new, empty set with a custom slab layout.
    ///
    /// `new()` keeps the spec's documented defaults; this constructor
    /// exists so tests and small embeddings aren't forced to eagerly
    /// allocate a 1,000,000-node (16MB) first block just to exercise the
    /// algorithm. The total capacity is `block_size * block_count` nodes.
    pub fn with_block_layout(block_size: usize, block_count: usize) -> Self {
        // Sentinels are plain heap allocations, outside the slab pool —
        // the pool exists only for user-inserted nodes, matching
        // `original_source`'s separate `malloc` calls for head/tail.
        let tail = Box::into_raw(Box::new(Node {
            value: i64::MAX,
            next: AtomicUsize::new(0),
        }));
        let head = Box::into_raw(Box::new(Node {
            value: i64::MIN,
            next: AtomicUsize::new(tail as usize),
        }));
        Self {
            head,
            tail,
            slab: Slab::new(block_size, block_count),
        }
    }

    /// Locates the boundary around `value`.
    ///
    /// Returns `(left, right)` such that, at some instant during the call,
    /// `left.value < value <= right.value` and `left.next == right`
    /// (unmarked). Along the way, any run of marked (logically deleted)
    /// nodes found between `left` and `right` is opportunistically
    /// unlinked via CAS.
    fn search(&self, value: i64) -> (*mut Node, *mut Node) {
        'restart: loop {
            let mut left = self.head;
            // SAFETY: `head` is valid for the set's whole lifetime.
            let mut left_next_word = unsafe { (*self.head).next.load(Ordering::Acquire) };
            let mut cur = self.head;

            let right = loop {
                // SAFETY: `cur` is always either a sentinel or a slab node
                // reached by following `next` pointers from `head`; nodes
                // are never freed while reachable (see module docs).
                let cur_next_word = unsafe { (*cur).next.load(Ordering::Acquire) };
                if is_marked(cur_next_word) {
                    cur = raw(cur_next_word);
                    continue;
                }
                if unsafe { (*cur).value } >= value {
                    break cur;
                }
                left = cur;
                left_next_word = cur_next_word;
                cur = raw(cur_next_word);
            };

            if raw(left_next_word) == right {
                return (left, right);
            }

            // A run of marked nodes sits between `left` and `right`. Before
            // splicing it out, make sure no *unmarked* (live) node snuck in
            // there — that would mean a concurrent `add` raced with us.
            let mut i = raw(left_next_word);
            while i != right {
                // SAFETY: `i` lies on the path from `left` to `right`
                // established above; it stays reachable until unlinked.
                let i_next_word = unsafe { (*i).next.load(Ordering::Acquire) };
                if !is_marked(i_next_word) {
                    continue 'restart;
                }
                i = raw(i_next_word);
            }

            let expected = raw(left_next_word) as usize;
            let next_ref = unsafe { &(*left).next };
            match atomic::cas(next_ref, expected, right as usize) {
                Ok(_) => return (left, right),
                Err(_) => continue 'restart,
            }
        }
    }

    /// Returns whether `value` is currently in the set.
    ///
    /// Implemented via [`search`](Self::search), which is uniform with
    /// `add`/`remove` and amortizes marked-node cleanup for later callers.
    /// A pure, non-mutating traversal would be equally correct and
    /// strictly lock-free — the spec leaves the choice open (see
    /// DESIGN.md); this crate picks `search` for uniformity.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if `value` is `i64::MIN` or `i64::MAX` —
    /// those are reserved for the sentinels and are never valid set
    /// members.
    pub fn contains(&self, value: i64) -> bool {
        debug_assert!(
            value > i64::MIN && value < i64::MAX,
            "i64::MIN/i64::MAX are reserved sentinel values"
        );
        let (_left, right) = self.search(value);
        // SAFETY: `right` is always a live pointer (sentinel or slab node).
        unsafe { (*right).value == value }
    }

    /// Inserts `value`, returning `true` if it was absent (and so
    /// inserted) or `false` if it was already present.
    ///
    /// # Panics
    ///
    /// See [`contains`](Self::contains).
    pub fn add(&self, value: i64) -> bool {
        debug_assert!(
            value > i64::MIN && value < i64::MAX,
            "i64::MIN/i64::MAX are reserved sentinel values"
        );

        // Allocated lazily on the first iteration and reused across
        // retries: the node's value never changes, and its `next` field is
        // rewritten every retry, so there is no reason to pay for a fresh
        // slab slot on every CAS failure.
        let mut pending: Option<*mut Node> = None;

        loop {
            let (left, right) = self.search(value);
            // SAFETY: `right` is always live.
            if unsafe { (*right).value } == value {
                return false;
            }

            let node = *pending.get_or_insert_with(|| self.alloc_node(value));
            // SAFETY: `node` was just allocated (or allocated on a prior,
            // failed iteration) and is not yet reachable from the list, so
            // no other thread can observe or race this write.
            unsafe {
                (*node).next.store(right as usize, Ordering::Relaxed);
            }

            let left_next_ref = unsafe { &(*left).next };
            if atomic::cas(left_next_ref, right as usize, node as usize).is_ok() {
                debug_assert!(self.debug_is_sorted());
                return true;
            }
            // CAS lost the race with a concurrent insert/delete at `left`;
            // retry the whole search, reusing `node`.
        }
    }

    /// Removes `value`, returning `true` if it was present (and so
    /// logically removed) or `false` if it was absent.
    ///
    /// # Panics
    ///
    /// See [`contains`](Self::contains).
    pub fn remove(&self, value: i64) -> bool {
        debug_assert!(
            value > i64::MIN && value < i64::MAX,
            "i64::MIN/i64::MAX are reserved sentinel values"
        );

        loop {
            let (left, right) = self.search(value);
            // SAFETY: `right` is always live.
            if unsafe { (*right).value } != value {
                return false;
            }

            let right_next_ref = unsafe { &(*right).next };
            let next_word = right_next_ref.load(Ordering::Acquire);
            if is_marked(next_word) {
                // Someone else is already deleting this node; their removal
                // and ours are not distinguishable as "the same winner", so
                // retry the search — by the time we come back around either
                // this value is gone (we'll see `right.value != value`) or
                // a fresh node with this value exists to race against.
                continue;
            }

            if atomic::cas(right_next_ref, next_word, with_mark(next_word)).is_err() {
                continue;
            }

            // Logical delete linearizes here. Physical unlink is
            // best-effort: if it fails, a later `search` will clean up.
            let left_next_ref = unsafe { &(*left).next };
            let _ = atomic::cas(left_next_ref, right as usize, next_word);
            debug_assert!(self.debug_is_sorted());
            return true;
        }
    }

    /// Counts live elements by linear traversal of unmarked next-pointers.
    ///
    /// Not linearizable under concurrent mutation — correct only when
    /// called in a quiescent state.
    pub fn len(&self) -> usize {
        let mut count = 0;
        // SAFETY: see `search`; nodes on the unmarked path from `head` to
        // `tail` stay reachable and allocated for the set's lifetime.
        unsafe {
            let mut cur = raw((*self.head).next.load(Ordering::Acquire));
            while cur != self.tail {
                count += 1;
                cur = raw((*cur).next.load(Ordering::Acquire));
            }
        }
        count
    }

    /// Returns whether the set currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc_node(&self, value: i64) -> *mut Node {
        match self.slab.alloc() {
            Ok(ptr) => {
                // SAFETY: `ptr` is a freshly claimed, exclusive slot — the
                // slab guarantees no other `alloc()` call can return the
                // same index.
                unsafe {
                    (*ptr).value = value;
                    (*ptr).next.store(0, Ordering::Relaxed);
                }
                ptr
            }
            // The slab's capacity (block_size * block_count) has been
            // exhausted. The abstract spec treats this as an unrecoverable
            // condition ("the implementation may abort"); there is no
            // sensible value this function could return to a caller of the
            // infallible `add`.
            Err(_exhausted) => std::process::abort(),
        }
    }

    #[cfg(test)]
    fn debug_is_sorted(&self) -> bool {
        unsafe {
            let mut cur = self.head;
            while cur != self.tail {
                let next = raw((*cur).next.load(Ordering::Acquire));
                if (*cur).value >= (*next).value {
                    return false;
                }
                cur = next;
            }
            true
        }
    }

    #[cfg(test)]
    fn debug_snapshot(&self) -> Vec<i64> {
        let mut values = Vec::new();
        unsafe {
            let mut cur = raw((*self.head).next.load(Ordering::Acquire));
            while cur != self.tail {
                values.push((*cur).value);
                cur = raw((*cur).next.load(Ordering::Acquire));
            }
        }
        values
    }
}

impl Default for LockFreeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockFreeSet {
    /// Frees the sentinels and the entire slab pool.
    ///
    /// User-inserted nodes (marked or not) live inside the slab's blocks
    /// and are reclaimed in bulk by `Slab`'s own `Drop`, not individually —
    /// matching the spec's "not freed during list operation... reclaimed
    /// only at list destruction".
    fn drop(&mut self) {
        // SAFETY: exclusive (`&mut self`) access means no operation can be
        // concurrently in flight; both sentinels were allocated exactly
        // once via `Box::into_raw` in `with_block_layout`.
        unsafe {
            drop(Box::from_raw(self.head));
            drop(Box::from_raw(self.tail));
        }
        self.head = ptr::null_mut();
        self.tail = ptr::null_mut();
        // `self.slab` drops automatically after this function returns.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_set() -> LockFreeSet {
        LockFreeSet::with_block_layout(64, 4)
    }

    #[test]
    fn new_set_is_empty() {
        let set = small_set();
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
        assert!(set.debug_snapshot().is_empty());
    }

    #[test]
    fn scenario_add_remove_round_trip() {
        let set = small_set();
        assert!(set.add(5));
        assert!(!set.add(5));
        assert!(set.contains(5));
        assert!(set.remove(5));
        assert!(!set.contains(5));
        assert!(!set.remove(5));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn scenario_internal_order_is_sorted() {
        let set = small_set();
        assert!(set.add(3));
        assert!(set.add(1));
        assert!(set.add(2));
        assert_eq!(set.len(), 3);
        assert_eq!(set.debug_snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn scenario_mixed_inserts_and_removes() {
        let set = small_set();
        for v in [7, 3, 9, 1, 5] {
            assert!(set.add(v));
        }
        assert!(set.remove(3));
        assert!(set.remove(1));
        assert_eq!(set.len(), 3);
        assert!(set.contains(5));
        assert!(!set.contains(3));
        assert_eq!(set.debug_snapshot(), vec![5, 7, 9]);
    }

    #[test]
    fn remove_on_empty_returns_false() {
        let set = small_set();
        assert!(!set.remove(42));
    }

    #[test]
    fn remove_then_reinsert_is_sorted_and_live() {
        let set = small_set();
        assert!(set.add(1));
        assert!(set.add(2));
        assert!(set.add(3));
        assert!(set.remove(2));
        // Re-inserting a logically deleted value's slot must not resurrect
        // the marked node; it must allocate/link a fresh one.
        assert!(set.add(2));
        assert_eq!(set.debug_snapshot(), vec![1, 2, 3]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    #[should_panic]
    fn add_sentinel_value_panics_in_debug() {
        let set = small_set();
        set.add(i64::MIN);
    }

    #[test]
    fn concurrent_workload_preserves_sortedness() {
        use std::sync::Arc;
        use std::thread;

        // Worst case, every `add` call allocates once (CAS retries reuse
        // the pending node), so capacity just needs to cover the number of
        // `add` calls across all threads.
        let set = Arc::new(LockFreeSet::with_block_layout(256, 64));
        const THREADS: usize = 8;
        const KEY_SPACE: i64 = 200;

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    let mut x = 1u64.wrapping_add(t as u64);
                    for _ in 0..2_000 {
                        x ^= x << 13;
                        x ^= x >> 7;
                        x ^= x << 17;
                        let value = (x % KEY_SPACE as u64) as i64;
                        match x % 3 {
                            0 => {
                                set.add(value);
                            }
                            1 => {
                                set.remove(value);
                            }
                            _ => {
                                set.contains(value);
                            }
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert!(set.debug_is_sorted());
        let snapshot = set.debug_snapshot();
        assert_eq!(snapshot.len(), set.len());
        let mut sorted = snapshot.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(snapshot, sorted, "duplicates or disorder after concurrent workload");
    }
}
