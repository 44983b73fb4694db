use crate::backoff::Backoff;
use crate::config::CoreConfig;
use crate::error::{CoreError, Tier as ErrorTier};
use crate::invariants::{debug_assert_refcount_published_once, debug_assert_slot_free_before_acquire};
use crate::message::MessageType;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TierIndex {
    Tier0,
    Tier1,
    Tier2,
}

impl From<TierIndex> for ErrorTier {
    fn from(t: TierIndex) -> Self {
        match t {
            TierIndex::Tier0 => ErrorTier::Tier0,
            TierIndex::Tier1 => ErrorTier::Tier1,
            TierIndex::Tier2 => ErrorTier::Tier2,
        }
    }
}

/// Identifies one slot in the pool. Opaque to callers outside this crate;
/// carries the tier so release/read never need to search for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    tier: TierIndex,
    index: u32,
}

struct Slot {
    /// 0 = free/unpublished. Transitions 0 -> n exactly once (at publish)
    /// and is decremented by each sink's release; the decrement that
    /// brings it back to 0 is the sole event that frees the slot.
    ref_count: AtomicU32,
    message_type: UnsafeCell<Option<MessageType>>,
    length: AtomicUsize,
    data: UnsafeCell<Box<[u8]>>,
}

// SAFETY: `message_type`/`length`/`data` are written only by the Extractor
// before `publish`'s Release store on `ref_count`, and read only after a
// consumer's Acquire load observes a nonzero `ref_count` — the same
// protocol a seqlock uses, specialized to a pool where "odd" is simply
// "zero".
unsafe impl Sync for Slot {}

struct Tier {
    slots: Box<[Slot]>,
    free: Box<[AtomicBool]>,
    cursor: AtomicUsize,
}

impl Tier {
    fn new(slot_size: usize, count: usize) -> Self {
        let slots: Vec<Slot> = (0..count)
            .map(|_| Slot {
                ref_count: AtomicU32::new(0),
                message_type: UnsafeCell::new(None),
                length: AtomicUsize::new(0),
                data: UnsafeCell::new(vec![0u8; slot_size].into_boxed_slice()),
            })
            .collect();
        let free: Vec<AtomicBool> = (0..count).map(|_| AtomicBool::new(true)).collect();
        Self {
            slots: slots.into_boxed_slice(),
            free: free.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// One pass over the free bitmap looking for a slot to claim. `None`
    /// means every slot was busy on this pass, not that the pool is
    /// permanently exhausted — callers retry with backoff.
    fn try_acquire_once(&self) -> Option<u32> {
        let n = self.slots.len();
        for _ in 0..n {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
            if self.free[idx]
                .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                debug_assert_slot_free_before_acquire!(self.slots[idx].ref_count.load(Ordering::Relaxed));
                return Some(idx as u32);
            }
        }
        None
    }
}

/// A live, readable view of a published slot's contents, handed to a sink by
/// the Router. Borrowed from the pool; the sink must call
/// [`crate::Core::release`] with the slot's id exactly once (directly, or by
/// letting a panic be caught and force-released by the Router).
pub struct ReadHandle<'a> {
    slot_id: SlotId,
    message_type: MessageType,
    data: &'a [u8],
}

impl<'a> ReadHandle<'a> {
    /// Identifies the slot backing this handle. A sink passes this to
    /// [`crate::Core::release`] exactly once to return the slot to its pool.
    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// Size-tiered, refcounted, variable-size message slot pool.
///
/// Three fixed-size tiers are sized at construction from [`CoreConfig`].
/// `acquire` picks the smallest tier that fits the requested length.
pub struct SlotPool {
    tiers: [Tier; 3],
    tier_sizes: [usize; 3],
    retry_spins: u32,
}

impl SlotPool {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            tiers: [
                Tier::new(config.tier0_slot_size, config.tier0_count),
                Tier::new(config.tier1_slot_size, config.tier1_count),
                Tier::new(config.tier2_slot_size, config.tier2_count),
            ],
            tier_sizes: [config.tier0_slot_size, config.tier1_slot_size, config.tier2_slot_size],
            retry_spins: config.acquire_retry_spins,
        }
    }

    fn tier_index_for_len(&self, len: usize) -> Option<TierIndex> {
        if len <= self.tier_sizes[0] {
            Some(TierIndex::Tier0)
        } else if len <= self.tier_sizes[1] {
            Some(TierIndex::Tier1)
        } else if len <= self.tier_sizes[2] {
            Some(TierIndex::Tier2)
        } else {
            None
        }
    }

    fn tier(&self, t: TierIndex) -> &Tier {
        match t {
            TierIndex::Tier0 => &self.tiers[0],
            TierIndex::Tier1 => &self.tiers[1],
            TierIndex::Tier2 => &self.tiers[2],
        }
    }

    /// Acquires a slot able to hold `len` bytes, retrying with adaptive
    /// backoff up to the configured spin budget before giving up.
    pub fn acquire(&self, len: usize) -> Result<SlotId, CoreError> {
        let tier_idx = self.tier_index_for_len(len).ok_or(CoreError::PoolExhausted {
            tier: ErrorTier::Tier2,
        })?;
        let tier = self.tier(tier_idx);

        if let Some(idx) = tier.try_acquire_once() {
            return Ok(SlotId { tier: tier_idx, index: idx });
        }

        let mut backoff = Backoff::new();
        let mut spins = 0u32;
        while spins < self.retry_spins {
            backoff.snooze();
            spins += 1;
            if let Some(idx) = tier.try_acquire_once() {
                return Ok(SlotId { tier: tier_idx, index: idx });
            }
        }

        Err(CoreError::PoolExhausted { tier: tier_idx.into() })
    }

    /// Writes the message type for a not-yet-published slot. Producer-only,
    /// no synchronization needed — visibility is established by `publish`.
    pub fn set_type(&self, slot_id: SlotId, message_type: MessageType) {
        let slot = &self.tier(slot_id.tier).slots[slot_id.index as usize];
        // SAFETY: only the Extractor (the sole producer) touches this
        // before `publish`'s Release store makes the slot visible.
        unsafe {
            *slot.message_type.get() = Some(message_type);
        }
    }

    /// Writes `data` into the slot's backing buffer starting at offset 0.
    /// Producer-only, same synchronization story as `set_type`.
    pub fn write_data(&self, slot_id: SlotId, data: &[u8]) {
        let slot = &self.tier(slot_id.tier).slots[slot_id.index as usize];
        // SAFETY: see `set_type`.
        unsafe {
            let buf = &mut *slot.data.get();
            buf[..data.len()].copy_from_slice(data);
        }
        slot.length.store(data.len(), Ordering::Relaxed);
    }

    /// Publishes the slot, transitioning its ref_count 0 -> `initial_refcount`
    /// in one step. Must be the last write the Extractor makes to this slot.
    pub fn publish(&self, slot_id: SlotId, initial_refcount: u32) {
        let slot = &self.tier(slot_id.tier).slots[slot_id.index as usize];
        let prev = slot.ref_count.load(Ordering::Relaxed);
        debug_assert_refcount_published_once!(prev);
        slot.ref_count.store(initial_refcount, Ordering::Release);
    }

    /// Reads a published slot's type and data. The Acquire load on
    /// `ref_count` synchronizes with `publish`'s Release store, so the type
    /// and data observed here are always the ones written before publish.
    pub fn read(&self, slot_id: SlotId) -> ReadHandle<'_> {
        let slot = &self.tier(slot_id.tier).slots[slot_id.index as usize];
        let _ref_count = slot.ref_count.load(Ordering::Acquire);
        // SAFETY: the Acquire load above happens-after the producer's
        // publish Release store, so these reads observe fully-initialized
        // data.
        let message_type = unsafe { (*slot.message_type.get()).expect("read of unpublished slot") };
        let len = slot.length.load(Ordering::Relaxed);
        let data = unsafe { &(*slot.data.get())[..len] };
        ReadHandle { slot_id, message_type, data }
    }

    /// Releases one reference. When the count reaches zero the slot is
    /// returned to its tier's free pool, becoming re-acquirable.
    pub fn release(&self, slot_id: SlotId) {
        let tier = self.tier(slot_id.tier);
        let slot = &tier.slots[slot_id.index as usize];
        let prev = slot.ref_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            tier.free[slot_id.index as usize].store(true, Ordering::Release);
        }
    }

    /// Number of slots across all tiers whose ref_count is still nonzero —
    /// used by `Core::stop`'s drain wait.
    pub fn live_count(&self) -> usize {
        self.tiers
            .iter()
            .flat_map(|t| t.slots.iter())
            .filter(|s| s.ref_count.load(Ordering::Relaxed) != 0)
            .count()
    }
}

// SAFETY: all interior mutability is protocol-guarded as documented on
// `Slot`; `SlotPool` itself holds no raw pointers of its own.
unsafe impl Send for SlotPool {}
unsafe impl Sync for SlotPool {}
