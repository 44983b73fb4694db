use crate::invariants::{debug_assert_head_not_past_tail, debug_assert_monotonic};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

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

/// The single-producer single-consumer queue of dispatch envelopes the
/// Extractor publishes into and the Router drains from — the concrete
/// realization of the wait-free mailbox the Router/sinks context polls.
///
/// Structurally this is the same sequence-number ring the byte path uses,
/// narrowed to one `Copy` envelope type and given a plain push/drain API
/// since, unlike `ByteRing`, nothing here ever needs to rewind a cursor.
pub struct Mailbox<T: Copy> {
    tail: CacheAligned<AtomicU64>,
    cached_head: CacheAligned<UnsafeCell<u64>>,
    head: CacheAligned<AtomicU64>,
    cached_tail: CacheAligned<UnsafeCell<u64>>,
    capacity: usize,
    mask: usize,
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

unsafe impl<T: Copy + Send> Send for Mailbox<T> {}
unsafe impl<T: Copy + Send> Sync for Mailbox<T> {}

impl<T: Copy> Mailbox<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "Mailbox capacity must be a power of two");
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
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues one envelope. Returns `false` if the mailbox is full — the
    /// caller (the Extractor) drops the already-classified message, releasing
    /// its slot references, and surfaces the drop via `Stats` and
    /// `EventListener::on_mailbox_full` rather than blocking the extraction
    /// thread on backpressure.
    pub fn push(&self, item: T) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head is written only by the producer (this path).
        let cached_head = unsafe { *self.cached_head.get() };
        let mut space = self.capacity.saturating_sub(tail.wrapping_sub(cached_head) as usize);

        if space == 0 {
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: cached_head is written only by the producer (this path).
            unsafe {
                *self.cached_head.get() = head;
            }
            space = self.capacity.saturating_sub(tail.wrapping_sub(head) as usize);
            if space == 0 {
                return false;
            }
        }

        let idx = (tail as usize) & self.mask;
        // SAFETY: slot `idx` lies at sequence `tail`, which the consumer
        // cannot yet have read (it is outside [head, tail)).
        unsafe {
            let buf = &mut *self.buffer.get();
            buf[idx] = MaybeUninit::new(item);
        }

        let new_tail = tail.wrapping_add(1);
        debug_assert_monotonic!("mailbox tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);
        true
    }

    /// Dequeues one envelope, or `None` if empty.
    pub fn try_recv(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);

        // SAFETY: cached_tail is written only by the consumer (this path).
        let mut cached_tail = unsafe { *self.cached_tail.get() };
        if head == cached_tail {
            cached_tail = self.tail.load(Ordering::Acquire);
            // SAFETY: cached_tail is written only by the consumer (this path).
            unsafe {
                *self.cached_tail.get() = cached_tail;
            }
            if head == cached_tail {
                return None;
            }
        }

        let idx = (head as usize) & self.mask;
        // SAFETY: slot `idx` lies at sequence `head`, which is within
        // [head, tail) and therefore was fully written by the producer and
        // published via the Acquire-synchronized Release store on `tail`.
        let item = unsafe {
            let buf = &*self.buffer.get();
            buf[idx].assume_init()
        };

        let new_head = head.wrapping_add(1);
        debug_assert_head_not_past_tail!(new_head, cached_tail);
        debug_assert_monotonic!("mailbox head", head, new_head);
        self.head.store(new_head, Ordering::Release);
        Some(item)
    }

    /// Drains up to `max` envelopes, invoking `handler` for each in FIFO
    /// order. Returns the number drained.
    pub fn drain_up_to<F: FnMut(T)>(&self, max: usize, mut handler: F) -> usize {
        let mut n = 0;
        while n < max {
            match self.try_recv() {
                Some(item) => {
                    handler(item);
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}
