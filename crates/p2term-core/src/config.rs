use std::time::Duration;

/// Fixed configuration for one [`crate::Core`] instance.
///
/// All fields are set once at construction and never change for the
/// lifetime of the core; nothing here is renegotiated at runtime.
#[derive(Debug, Clone, Copy)]
pub struct CoreConfig {
    /// `ByteRing` capacity as a power of 2 (default: 21 = 2MiB of buffered bytes).
    pub ring_bits: u8,
    /// Capacity of tier 0 slots in bytes (default: 256, binary-packet-sized).
    pub tier0_slot_size: usize,
    /// Number of tier 0 slots.
    pub tier0_count: usize,
    /// Capacity of tier 1 slots in bytes (default: 4096, typical text line).
    pub tier1_slot_size: usize,
    /// Number of tier 1 slots.
    pub tier1_count: usize,
    /// Capacity of tier 2 slots in bytes (default: 65536, worst-case window payload).
    pub tier2_slot_size: usize,
    /// Number of tier 2 slots.
    pub tier2_count: usize,
    /// Largest binary-debug-packet payload accepted before `CorruptBinaryLength`.
    pub max_binary_payload: usize,
    /// Largest text-message payload accepted before truncation/drop.
    pub max_text_length: usize,
    /// Extractor batch cap: messages emitted before it cooperatively yields.
    pub extractor_batch_cap: usize,
    /// How long the Extractor parks when the ring has nothing to read.
    pub extractor_idle_park: Duration,
    /// Bounded spin budget for `SlotPool::acquire` before declaring `PoolExhausted`.
    pub acquire_retry_spins: u32,
    /// Bound on how long `Core::stop` waits for in-flight slots to drain.
    pub drain_timeout: Duration,
    /// Depth of the Extractor → Router mailbox.
    pub mailbox_bits: u8,
}

impl CoreConfig {
    /// Returns the `ByteRing` capacity in bytes.
    #[inline]
    pub const fn ring_capacity(&self) -> usize {
        1 << self.ring_bits
    }

    /// Returns the mailbox capacity in envelopes.
    #[inline]
    pub const fn mailbox_capacity(&self) -> usize {
        1 << self.mailbox_bits
    }

    /// A configuration tuned for minimal end-to-end latency: small ring,
    /// small batches, short idle park.
    pub fn low_latency() -> Self {
        Self {
            ring_bits: 13, // 8KiB
            extractor_batch_cap: 16,
            extractor_idle_park: Duration::from_micros(200),
            ..Self::default()
        }
    }

    /// A configuration tuned for sustained high throughput: large ring,
    /// large batches, longer idle park to avoid wasted wakeups.
    pub fn high_throughput() -> Self {
        Self {
            ring_bits: 18, // 256KiB
            tier0_count: 512,
            tier1_count: 256,
            tier2_count: 32,
            extractor_batch_cap: 256,
            extractor_idle_park: Duration::from_millis(1),
            mailbox_bits: 12,
            ..Self::default()
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            ring_bits: 21, // 2MiB
            tier0_slot_size: 256,
            tier0_count: 128,
            tier1_slot_size: 4096,
            tier1_count: 64,
            tier2_slot_size: 65536,
            tier2_count: 8,
            max_binary_payload: 8192,
            max_text_length: 65536,
            extractor_batch_cap: 100,
            extractor_idle_park: Duration::from_micros(500),
            acquire_retry_spins: 1000,
            drain_timeout: Duration::from_secs(2),
            mailbox_bits: 10,
        }
    }
}
