//! Fine-grained lock-based sorted set (hand-over-hand ticket locks).
//!
//! Every node carries its own [`TicketLock`]. To mutate the link at a given
//! position a thread must hold the lock of that position's predecessor;
//! removing a node additionally requires holding the node's own lock. A
//! thread walks the list locking its next step before releasing its
//! current one ("hand-over-hand" / lock-coupling), which is what lets
//! `add`/`remove` run concurrently at different positions in the list
//! without a single global lock.
//!
//! Ported from `original_source/src/linkedlist-lock/linkedlist.c`.

use std::ptr;

use crate::atomic::Ordering;
use crate::ticket::TicketLock;

#[cfg(loom)]
use loom::sync::atomic::AtomicPtr;
#[cfg(not(loom))]
use std::sync::atomic::AtomicPtr;

struct Node {
    value: i64,
    next: AtomicPtr<Node>,
    lock: TicketLock,
}

impl Node {
    fn new_boxed(value: i64, next: *mut Node) -> *mut Node {
        Box::into_raw(Box::new(Node {
            value,
            next: AtomicPtr::new(next),
            lock: TicketLock::new(),
        }))
    }
}

/// A concurrent sorted set of `i64` backed by a hand-over-hand, ticket-lock
/// singly linked list.
///
/// `contains` never blocks; `add` and `remove` hold at most two adjacent
/// node locks at a time. Locks are always acquired in list order (forward
/// traversal from `head`), so the lock order is a total order and the set
/// is deadlock-free.
pub struct LockBasedSet {
    head: *mut Node,
    tail: *mut Node,
}

// SAFETY: all mutable state (`Node::next`) is either lock-protected or
// atomic; the set has no thread-local state.
unsafe impl Send for LockBasedSet {}
unsafe impl Sync for LockBasedSet {}

impl LockBasedSet {
    /// Creates a new, empty set with sentinel `i64::MIN`/`i64::MAX` nodes.
    pub fn new() -> Self {
        let tail = Node::new_boxed(i64::MAX, ptr::null_mut());
        let head = Node::new_boxed(i64::MIN, tail);
        Self { head, tail }
    }

    /// Returns whether `value` is currently in the set.
    ///
    /// This is a weak-consistency, lock-free read: there is no mark bit in
    /// this variant, so a concurrent `remove` re-links the predecessor in
    /// a single atomic store. A reader may briefly traverse into a node
    /// that has just been unlinked, but that node's `value` is immutable
    /// and its `next` still points forward past the removed position, so
    /// the reader always converges to a correct answer without crossing
    /// two points whose existence contradicts the read.
    pub fn contains(&self, value: i64) -> bool {
        debug_assert!(
            value > i64::MIN && value < i64::MAX,
            "i64::MIN/i64::MAX are reserved sentinel values"
        );
        // SAFETY: sentinels live for the whole lifetime of `self`; every
        // node reachable by following `next` was published by a completed
        // `add` and is never freed while reachable.
        unsafe {
            let mut cur = (*self.head).next.load(Ordering::Acquire);
            while (*cur).value < value {
                cur = (*cur).next.load(Ordering::Acquire);
            }
            (*cur).value == value
        }
    }

    /// Inserts `value`, returning `true` if it was absent (and so inserted)
    /// or `false` if it was already present.
    pub fn add(&self, value: i64) -> bool {
        debug_assert!(
            value > i64::MIN && value < i64::MAX,
            "i64::MIN/i64::MAX are reserved sentinel values"
        );
        // SAFETY: `left` and `left_next` are always either a sentinel or a
        // node published by a prior `add`; the hand-over-hand discipline
        // guarantees the currently-locked `left` cannot be concurrently
        // unlinked (removing it would require holding its own predecessor's
        // lock, which this thread already holds while `left` is locked).
        unsafe {
            let mut left = self.head;
            (*left).lock.acquire();

            loop {
                let left_next = (*left).next.load(Ordering::Acquire);
                if (*left_next).value < value {
                    (*left_next).lock.acquire();
                    (*left).lock.release();
                    left = left_next;
                    continue;
                }

                if (*left_next).value == value {
                    (*left).lock.release();
                    return false;
                }

                let node = Node::new_boxed(value, left_next);
                (*left).next.store(node, Ordering::Release);
                (*left).lock.release();
                debug_assert!(self.debug_is_sorted());
                return true;
            }
        }
    }

    /// Removes `value`, returning `true` if it was present (and so
    /// removed) or `false` if it was absent.
    pub fn remove(&self, value: i64) -> bool {
        debug_assert!(
            value > i64::MIN && value < i64::MAX,
            "i64::MIN/i64::MAX are reserved sentinel values"
        );
        // SAFETY: see `add` — the hand-over-hand discipline keeps every
        // pointer this function dereferences alive and reachable for as
        // long as the relevant lock is held.
        unsafe {
            let mut left = self.head;
            (*left).lock.acquire();
            let mut right = (*left).next.load(Ordering::Acquire);
            (*right).lock.acquire();

            loop {
                if (*right).value >= value {
                    break;
                }
                (*left).lock.release();
                left = right;
                right = (*right).next.load(Ordering::Acquire);
                (*right).lock.acquire();
            }

            if (*right).value != value {
                (*right).lock.release();
                (*left).lock.release();
                return false;
            }

            let right_next = (*right).next.load(Ordering::Acquire);
            (*left).next.store(right_next, Ordering::Release);
            (*right).lock.release();
            (*left).lock.release();

            // SAFETY: `right` was just unlinked while holding both its own
            // lock and its predecessor's; no other thread can still be
            // holding a reference to it, since reaching it requires either
            // following `left.next` (now bypassing it) or already being
            // inside this same critical section.
            drop(Box::from_raw(right));
            debug_assert!(self.debug_is_sorted());
            true
        }
    }

    /// Counts the live (non-sentinel) elements by linear traversal.
    ///
    /// Not linearizable under concurrent mutation — correct only when
    /// called in a quiescent state, i.e. with no concurrent `add`/`remove`.
    pub fn len(&self) -> usize {
        let mut count = 0;
        // SAFETY: see `contains`.
        unsafe {
            let mut cur = (*self.head).next.load(Ordering::Acquire);
            while cur != self.tail {
                count += 1;
                cur = (*cur).next.load(Ordering::Acquire);
            }
        }
        count
    }

    /// Returns whether the set currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn debug_is_sorted(&self) -> bool {
        unsafe {
            let mut cur = self.head;
            while cur != self.tail {
                let next = (*cur).next.load(Ordering::Acquire);
                if (*cur).value >= (*next).value {
                    return false;
                }
                cur = next;
            }
            true
        }
    }

    /// Snapshot of the live values in list order, for test assertions.
    /// Not part of the public API surface proper — only compiled for tests.
    #[cfg(test)]
    fn debug_snapshot(&self) -> Vec<i64> {
        let mut values = Vec::new();
        unsafe {
            let mut cur = (*self.head).next.load(Ordering::Acquire);
            while cur != self.tail {
                values.push((*cur).value);
                cur = (*cur).next.load(Ordering::Acquire);
            }
        }
        values
    }
}

impl Default for LockBasedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockBasedSet {
    /// Frees every node, including both sentinels, by walking from `head`.
    ///
    /// The source's `list_delete` has an off-by-one bug: it writes
    /// `i = i->next` inside the loop *condition*, not the body, so `i`
    /// never advances and the head node is freed repeatedly. This
    /// implementation instead walks forward, freeing each node exactly
    /// once before advancing — the corrected behavior this spec adopts
    /// (see design notes).
    ///
    /// Not thread-safe with respect to any other operation on this set;
    /// this is enforced by the type system, since `drop` requires
    /// exclusive (`&mut self`) access.
    fn drop(&mut self) {
        let mut cur = self.head;
        while !cur.is_null() {
            // SAFETY: exclusive access to `self` here means no other
            // thread can be traversing the list; every node from `head`
            // onward was heap-allocated via `Node::new_boxed` and is freed
            // exactly once as this loop advances past it.
            unsafe {
                let next = (*cur).next.load(Ordering::Relaxed);
                drop(Box::from_raw(cur));
                cur = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_set_is_empty() {
        let set = LockBasedSet::new();
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
        assert!(set.debug_snapshot().is_empty());
    }

    #[test]
    fn scenario_add_remove_round_trip() {
        let set = LockBasedSet::new();
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
        let set = LockBasedSet::new();
        assert!(set.add(3));
        assert!(set.add(1));
        assert!(set.add(2));
        assert_eq!(set.len(), 3);
        assert_eq!(set.debug_snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn scenario_mixed_inserts_and_removes() {
        let set = LockBasedSet::new();
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
        let set = LockBasedSet::new();
        assert!(!set.remove(42));
    }

    #[test]
    fn add_distinct_values_net_count_matches_len() {
        let set = LockBasedSet::new();
        let mut expected = 0usize;
        for v in [10, -5, 0, 100, -100] {
            if set.add(v) {
                expected += 1;
            }
        }
        for v in [-5, 999] {
            if set.remove(v) {
                expected -= 1;
            }
        }
        assert_eq!(set.len(), expected);
    }

    #[test]
    fn concurrent_workload_preserves_sortedness() {
        use std::sync::Arc;
        use std::thread;

        let set = Arc::new(LockBasedSet::new());
        const THREADS: usize = 8;
        const KEY_SPACE: i64 = 200;

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    let mut x = 1u64.wrapping_add(t as u64);
                    for _ in 0..2_000 {
                        // xorshift: cheap, deterministic-per-seed PRNG with
                        // no extra dependency for this in-crate unit test.
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
