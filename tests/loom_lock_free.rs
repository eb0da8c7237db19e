//! Exhaustive interleaving check of the lock-free set under `loom`.
//!
//! Only compiled under `RUSTFLAGS="--cfg loom" cargo test --release
//! --test loom_lock_free`, never under a normal `cargo test` — loom
//! replaces `std::sync`/`std::thread` with its own instrumented versions
//! and explores every legal thread interleaving of a model, so workloads
//! here are deliberately tiny (2-3 threads, 2-3 ops each); anything larger
//! would not finish in reasonable time.
#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;

use sorted_set_unlocked::LockFreeSet;

#[test]
fn two_threads_disjoint_inserts_both_land() {
    loom::model(|| {
        let set = Arc::new(LockFreeSet::with_block_layout(8, 4));

        let s1 = Arc::clone(&set);
        let t1 = thread::spawn(move || {
            s1.add(1);
        });
        let s2 = Arc::clone(&set);
        let t2 = thread::spawn(move || {
            s2.add(2);
        });

        t1.join().unwrap();
        t2.join().unwrap();

        assert!(set.contains(1));
        assert!(set.contains(2));
        assert_eq!(set.len(), 2);
    });
}

#[test]
fn two_threads_racing_insert_same_value_exactly_one_wins() {
    loom::model(|| {
        let set = Arc::new(LockFreeSet::with_block_layout(8, 4));

        let s1 = Arc::clone(&set);
        let t1 = thread::spawn(move || s1.add(1));
        let s2 = Arc::clone(&set);
        let t2 = thread::spawn(move || s2.add(1));

        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();

        assert_ne!(r1, r2, "exactly one of two racing inserts must win");
        assert!(set.contains(1));
        assert_eq!(set.len(), 1);
    });
}

#[test]
fn insert_and_remove_race_leave_consistent_state() {
    loom::model(|| {
        let set = Arc::new(LockFreeSet::with_block_layout(8, 4));
        set.add(1);

        let s1 = Arc::clone(&set);
        let t1 = thread::spawn(move || s1.remove(1));
        let s2 = Arc::clone(&set);
        let t2 = thread::spawn(move || s2.add(2));

        let removed = t1.join().unwrap();
        let added = t2.join().unwrap();

        assert!(removed);
        assert!(added);
        assert!(!set.contains(1));
        assert!(set.contains(2));
        assert_eq!(set.len(), 1);
    });
}

#[test]
fn concurrent_remove_of_same_value_exactly_one_wins() {
    loom::model(|| {
        let set = Arc::new(LockFreeSet::with_block_layout(8, 4));
        set.add(1);

        let s1 = Arc::clone(&set);
        let t1 = thread::spawn(move || s1.remove(1));
        let s2 = Arc::clone(&set);
        let t2 = thread::spawn(move || s2.remove(1));

        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();

        assert_ne!(r1, r2, "exactly one of two racing removes must win");
        assert!(!set.contains(1));
        assert_eq!(set.len(), 0);
    });
}
