//! FIFO ticket lock with proportional backoff.
//!
//! Each waiter draws a ticket by incrementing `tail`; the lock is held by
//! whichever ticket equals `head`. Release just increments `head`, handing
//! the lock to the next ticket in line — strict FIFO, no CAS needed on the
//! release path because only the current holder ever touches `head`.
//!
//! Unlike a typical Rust mutex, this type exposes explicit [`acquire`] and
//! [`release`] methods instead of an RAII guard. Hand-over-hand list
//! traversal needs to hold a predecessor's lock and a successor's lock
//! simultaneously, with non-lexical, overlapping lifetimes ("acquire right,
//! *then* release left") that an RAII guard cannot express without
//! `ManuallyDrop`. Explicit acquire/release mirrors the source's
//! `lock_lock`/`lock_unlock` pairing directly.
//!
//! [`acquire`]: TicketLock::acquire
//! [`release`]: TicketLock::release

use crate::atomic;
use crate::atomic::{AtomicU32, Ordering};

/// Proportional-backoff constant: a waiter `dist` tickets behind the
/// current holder spins for `dist * TICKET_BACKOFF` pause iterations.
/// Tuning this does not affect correctness, only how quickly wake-up
/// traffic spreads out under contention.
const TICKET_BACKOFF: u32 = 100;

/// A FIFO ticket lock.
///
/// `head == tail` means the lock is free and the next ticket to be issued
/// is `tail`. The struct carries no payload: callers protect whatever data
/// is co-located with the lock (typically fields of the same `Node`) by
/// convention, not by type-level enforcement, matching the source's
/// embedding of `lock_head`/`lock_tail` directly inside `node_t`.
#[derive(Debug)]
pub struct TicketLock {
    head: AtomicU32,
    tail: AtomicU32,
}

impl TicketLock {
    /// Creates a new, unlocked ticket lock.
    ///
    /// `head = 0, tail = 0` encodes "no lock held, next ticket is 0". Any
    /// `head == tail` state works as the free state; this crate does *not*
    /// keep the source's `head=1, tail=0` numbering. The source draws
    /// tickets with increment-and-fetch (`IAF_U32`, returning the *new*
    /// value, so the first ticket issued is `1`), while [`atomic::fai`]
    /// is fetch-and-increment (returning the value *before* the increment,
    /// so the first ticket issued is `0`) — `fai` is shared with the slab
    /// allocator's bump index, which needs exactly that pre-increment
    /// return value as a zero-based array offset, so its semantics are
    /// fixed crate-wide. Starting both counters at `0` instead keeps
    /// `head == my_ticket` satisfiable on the very first `acquire`,
    /// matching `phdye-ck-rust/src/spinlock.rs`'s `TicketLock<T>`, which
    /// also starts both counters at `0` against a pre-increment
    /// `fetch_add`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
        }
    }

    /// Acquires the lock, blocking the calling thread until it is this
    /// thread's turn.
    ///
    /// Draws a ticket via fetch-and-increment on `tail`, then spins until
    /// `head` reaches that ticket, backing off proportionally to the
    /// distance remaining so waiters further back in line spin less
    /// aggressively.
    ///
    /// # Deadlock
    ///
    /// Reentrant acquisition (a thread calling `acquire` while already
    /// holding this same lock) deadlocks — there is no owner tracking, so
    /// the second call simply waits for a release that will never come
    /// from this thread. This can only hang the caller, never corrupt
    /// memory, so it is a safe (if misuse-prone) method.
    #[inline]
    pub fn acquire(&self) {
        let my_ticket = atomic::fai(&self.tail);
        loop {
            let now_serving = self.head.load(Ordering::Acquire);
            if now_serving == my_ticket {
                return;
            }
            let dist = my_ticket.wrapping_sub(now_serving);
            atomic::pause(dist.saturating_mul(TICKET_BACKOFF));
        }
    }

    /// Releases the lock.
    ///
    /// Only the current holder may call this. A compiler fence prevents
    /// the critical section's stores from being reordered past the
    /// release store that follows; no CAS is needed since at most one
    /// thread is ever in the critical section.
    #[inline]
    pub fn release(&self) {
        atomic::release_fence();
        self.head.fetch_add(1, Ordering::Release);
    }

    /// Returns whether the lock currently has a holder.
    ///
    /// Racy outside of a quiescent state; useful only for diagnostics and
    /// tests.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.head.load(Ordering::Relaxed) != self.tail.load(Ordering::Relaxed)
    }
}

impl Default for TicketLock {
    fn default() -> Self {
        Self::new()
    }
}
