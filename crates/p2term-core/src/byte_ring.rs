use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_monotonic,
};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING
// =============================================================================
//
// Single producer (Reader callback thread) appends bytes; single consumer
// (Extractor background thread) reads/peeks/saves/restores its own read
// cursor. `head` and `tail` are unbounded `u64` sequence numbers, masked to
// a buffer index only at access time — this sidesteps ABA entirely and lets
// `save`/`restore` hand back a plain sequence number as the cursor.
//
// Producer: Relaxed load of its own `tail`, Acquire load of `head` only when
// the cached value looks insufficient, Release store of the new `tail`.
// Consumer: Relaxed load of its own `head`, Acquire load of `tail` only when
// the cached value looks insufficient, Release store of the new `head`
// (including on `restore`, so a concurrent producer always observes a
// monotonically-useful read position).
// =============================================================================

#[repr(align(128))]
struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// A saved read position in a [`ByteRing`], usable to rewind after a failed
/// speculative classification attempt (e.g. backtracking out of a text-EOL
/// lookahead that turned out to belong to the next message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    seq: u64,
}

/// Single-producer single-consumer byte ring.
///
/// The producer (Reader) only ever calls [`ByteRing::append`]; the consumer
/// (Extractor) only ever calls `available`/`peek`/`next`/`save`/`restore`/
/// `clear`. No other thread touches either side.
pub struct ByteRing {
    tail: CacheAligned<AtomicU64>,
    cached_head: CacheAligned<UnsafeCell<u64>>,
    head: CacheAligned<AtomicU64>,
    cached_tail: CacheAligned<UnsafeCell<u64>>,
    capacity: usize,
    mask: usize,
    buffer: UnsafeCell<Box<[MaybeUninit<u8>]>>,
}

unsafe impl Send for ByteRing {}
unsafe impl Sync for ByteRing {}

impl ByteRing {
    /// Creates a ring with the given capacity, which must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "ByteRing capacity must be a power of two");
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);
        Self {
            tail: CacheAligned::new(AtomicU64::new(0)),
            cached_head: CacheAligned::new(UnsafeCell::new(0)),
            head: CacheAligned::new(AtomicU64::new(0)),
            cached_tail: CacheAligned::new(UnsafeCell::new(0)),
            capacity,
            mask: capacity - 1,
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered and unread.
    #[inline]
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) as usize
    }

    /// Writes all of `bytes`, or none of it. Returns `true` if the ring had
    /// room for the entire chunk, `false` if it didn't — in which case
    /// nothing was written and the caller (the Reader) must discard the
    /// whole chunk rather than retry a partial write.
    pub fn append(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        if bytes.len() > self.capacity {
            return false;
        }

        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head is written only by the producer (this path).
        let cached_head = unsafe { *self.cached_head.get() };
        let mut space = self
            .capacity
            .saturating_sub(tail.wrapping_sub(cached_head) as usize);

        if space < bytes.len() {
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: cached_head is written only by the producer (this path).
            unsafe {
                *self.cached_head.get() = head;
            }
            space = self.capacity.saturating_sub(tail.wrapping_sub(head) as usize);
        }

        if space < bytes.len() {
            return false;
        }
        let n = bytes.len();

        let idx = (tail as usize) & self.mask;
        let first = n.min(self.capacity - idx);

        // SAFETY: [idx, idx+first) and, if wrapping, [0, n-first) are the
        // slots in [tail, tail+n) the producer exclusively owns: the
        // consumer only reads [head, tail), and space >= n guarantees
        // tail+n - head <= capacity.
        unsafe {
            let buf = &mut *self.buffer.get();
            ptr::copy_nonoverlapping(bytes.as_ptr(), buf[idx..idx + first].as_mut_ptr().cast(), first);
            if first < n {
                ptr::copy_nonoverlapping(
                    bytes[first..].as_ptr(),
                    buf[0..n - first].as_mut_ptr().cast(),
                    n - first,
                );
            }
        }

        let new_tail = tail.wrapping_add(n as u64);
        let head_now = self.head.load(Ordering::Relaxed);
        debug_assert_bounded_count!(new_tail.wrapping_sub(head_now) as usize, self.capacity);
        debug_assert_monotonic!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);
        true
    }

    /// Copies up to `n` unread bytes starting at the current read position
    /// into a fresh, contiguous buffer, without advancing. A wrapped region
    /// is copied out into one contiguous `Vec`, so callers never need to
    /// reason about the ring boundary themselves.
    pub fn peek(&self, n: usize) -> Vec<u8> {
        let head = self.head.load(Ordering::Relaxed);

        // SAFETY: cached_tail is written only by the consumer (this path).
        let mut cached_tail = unsafe { *self.cached_tail.get() };
        let mut avail = cached_tail.wrapping_sub(head) as usize;

        if avail < n {
            cached_tail = self.tail.load(Ordering::Acquire);
            // SAFETY: cached_tail is written only by the consumer (this path).
            unsafe {
                *self.cached_tail.get() = cached_tail;
            }
            avail = cached_tail.wrapping_sub(head) as usize;
        }

        let to_copy = n.min(avail);
        let mut out = Vec::with_capacity(to_copy);
        let idx = (head as usize) & self.mask;
        let first = to_copy.min(self.capacity - idx);

        // SAFETY: these slots lie in [head, tail), which is fully
        // initialized by the producer and published via its Release store
        // on `tail`, synchronized-with by the Acquire load above.
        unsafe {
            let buf = &*self.buffer.get();
            out.extend(buf[idx..idx + first].iter().map(|s| s.assume_init()));
            if first < to_copy {
                out.extend(buf[0..to_copy - first].iter().map(|s| s.assume_init()));
            }
        }
        out
    }

    /// Consumes and returns the next unread byte, or `None` if the ring is
    /// empty.
    pub fn next(&self) -> Option<u8> {
        let bytes = self.peek(1);
        if bytes.is_empty() {
            return None;
        }
        self.advance(1);
        Some(bytes[0])
    }

    /// Advances the read position by `n` bytes without returning them
    /// (equivalent to `peek` followed by discarding the result).
    pub fn advance(&self, n: usize) {
        if n == 0 {
            return;
        }
        let head = self.head.load(Ordering::Relaxed);
        let new_head = head.wrapping_add(n as u64);
        let tail = self.tail.load(Ordering::Relaxed);
        debug_assert_head_not_past_tail!(new_head, tail);
        debug_assert_monotonic!("head", head, new_head);
        self.head.store(new_head, Ordering::Release);
    }

    /// Saves the current read position for a later [`ByteRing::restore`].
    pub fn save(&self) -> RingCursor {
        RingCursor {
            seq: self.head.load(Ordering::Relaxed),
        }
    }

    /// Rewinds the read position to a previously saved cursor. Used to back
    /// out of a speculative classification attempt.
    pub fn restore(&self, cursor: RingCursor) {
        self.head.store(cursor.seq, Ordering::Release);
    }

    /// Discards all unread bytes, advancing the read position to the
    /// producer's current tail. Used by golden-sync to resynchronize after
    /// a `P2SystemInit` marker.
    pub fn clear(&self) {
        let tail = self.tail.load(Ordering::Acquire);
        self.head.store(tail, Ordering::Release);
    }
}
