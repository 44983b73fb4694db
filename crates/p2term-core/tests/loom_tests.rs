//! Loom-based concurrency tests for the single-producer/single-consumer
//! cached-sequence-number protocol `ByteRing` and `Mailbox` both use.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings, so the model here is
//! deliberately a small, self-contained reproduction of the real
//! `tail`/`head`/`cached_head`/`cached_tail` protocol in `byte_ring.rs`
//! rather than the production type itself — the real type carries a
//! `Box<[MaybeUninit<u8>]>` payload and const-generic capacity that make it
//! awkward to swap in loom's shadow atomics, while the synchronization
//! protocol that actually needs exhaustive checking is fully captured by
//! this reduced model.

#![cfg(feature = "loom")]

use loom::cell::UnsafeCell;
use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

/// Reproduction of `ByteRing`'s producer/consumer cached-sequence protocol,
/// narrowed to a fixed-size `usize` slot ring so the state space loom has to
/// explore stays tractable.
struct ModelRing {
    tail: AtomicUsize,
    cached_head: UnsafeCell<usize>,
    head: AtomicUsize,
    cached_tail: UnsafeCell<usize>,
    buffer: UnsafeCell<[usize; 4]>,
}

unsafe impl Send for ModelRing {}
unsafe impl Sync for ModelRing {}

const CAPACITY: usize = 4;

impl ModelRing {
    fn new() -> Self {
        Self {
            tail: AtomicUsize::new(0),
            cached_head: UnsafeCell::new(0),
            head: AtomicUsize::new(0),
            cached_tail: UnsafeCell::new(0),
            buffer: UnsafeCell::new([0; CAPACITY]),
        }
    }

    /// Producer-only. Mirrors `ByteRing::append` for a single-item chunk:
    /// all-or-nothing, refreshing the cached head only when the fast path
    /// looks insufficient.
    fn push(&self, value: usize) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);

        let cached_head = unsafe { self.cached_head.with(|p| *p) };
        let mut space = CAPACITY.saturating_sub(tail.wrapping_sub(cached_head));

        if space == 0 {
            let head = self.head.load(Ordering::Acquire);
            unsafe { self.cached_head.with_mut(|p| *p = head) };
            space = CAPACITY.saturating_sub(tail.wrapping_sub(head));
        }

        if space == 0 {
            return false;
        }

        let idx = tail % CAPACITY;
        unsafe { self.buffer.with_mut(|p| (*p)[idx] = value) };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Consumer-only. Mirrors `ByteRing::next`.
    fn pop(&self) -> Option<usize> {
        let head = self.head.load(Ordering::Relaxed);

        let mut cached_tail = unsafe { self.cached_tail.with(|p| *p) };
        if head == cached_tail {
            cached_tail = self.tail.load(Ordering::Acquire);
            unsafe { self.cached_tail.with_mut(|p| *p = cached_tail) };
            if head == cached_tail {
                return None;
            }
        }

        let idx = head % CAPACITY;
        let value = unsafe { self.buffer.with(|p| (*p)[idx]) };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }
}

/// A value the consumer observes was written by the producer before the
/// producer's Release store on `tail` — never a torn or stale read.
#[test]
fn loom_producer_writes_are_visible_before_advancing_tail() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new());
        let ring2 = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            ring2.push(7);
        });

        let mut observed = None;
        for _ in 0..3 {
            if let Some(v) = ring.pop() {
                observed = Some(v);
                break;
            }
            loom::thread::yield_now();
        }

        producer.join().unwrap();

        if let Some(v) = observed {
            assert_eq!(v, 7, "consumer must never observe anything but the producer's committed value");
        }
    });
}

/// The consumer never reads more items than the producer committed, however
/// the two threads interleave.
#[test]
fn loom_consumer_never_outpaces_producer() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new());
        let ring_producer = Arc::clone(&ring);
        let ring_consumer = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            let mut sent = 0;
            if ring_producer.push(1) {
                sent += 1;
            }
            if ring_producer.push(2) {
                sent += 1;
            }
            sent
        });

        let consumer = thread::spawn(move || {
            let mut received = 0;
            for _ in 0..4 {
                if ring_consumer.pop().is_some() {
                    received += 1;
                }
                loom::thread::yield_now();
            }
            received
        });

        let sent = producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert!(received <= sent, "received {received} but producer only committed {sent}");
    });
}

/// Filling the ring to capacity rejects the next push whole — no partial
/// acceptance — and a single consumer pop frees exactly one slot.
#[test]
fn loom_full_ring_rejects_push_until_consumer_frees_a_slot() {
    loom::model(|| {
        let ring = Arc::new(ModelRing::new());
        for v in 0..CAPACITY {
            assert!(ring.push(v));
        }
        assert!(!ring.push(999), "ring at capacity must reject, not partially accept");

        let ring2 = Arc::clone(&ring);
        let consumer = thread::spawn(move || ring2.pop());
        let popped = consumer.join().unwrap();
        assert_eq!(popped, Some(0));

        assert!(ring.push(999), "one freed slot must admit exactly one more push");
    });
}
