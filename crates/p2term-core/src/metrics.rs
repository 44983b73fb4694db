use crate::message::KIND_COUNT;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Atomic instrumentation counters, updated from the Reader, Extractor and
/// Router without any locking.
#[derive(Debug, Default)]
pub struct Stats {
    extracted: AtomicU64,
    dropped_on_pool_full: AtomicU64,
    buffer_high_water_mark: AtomicUsize,
    overflow_events: AtomicU64,
    overflow_bytes: AtomicU64,
    corrupt_binary_length: AtomicU64,
    invalid_cog: AtomicU64,
    sink_faults: AtomicU64,
    shutdown_leaks: AtomicU64,
    dropped_envelopes: AtomicU64,
    per_type: [AtomicU64; KIND_COUNT],
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_extracted(&self, kind_index: usize) {
        self.extracted.fetch_add(1, Ordering::Relaxed);
        self.per_type[kind_index].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped_on_pool_full(&self) {
        self.dropped_on_pool_full.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_ring_occupancy(&self, occupied: usize) {
        let mut current = self.buffer_high_water_mark.load(Ordering::Relaxed);
        while occupied > current {
            match self.buffer_high_water_mark.compare_exchange_weak(
                current,
                occupied,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    #[inline]
    pub(crate) fn record_overflow(&self, dropped_bytes: usize) {
        self.overflow_events.fetch_add(1, Ordering::Relaxed);
        self.overflow_bytes
            .fetch_add(dropped_bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_corrupt_binary_length(&self) {
        self.corrupt_binary_length.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_invalid_cog(&self) {
        self.invalid_cog.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sink_fault(&self) {
        self.sink_faults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_shutdown_leak(&self, leaked: usize) {
        self.shutdown_leaks
            .fetch_add(leaked as u64, Ordering::Relaxed);
    }

    /// Records a message that was classified, published, and fanout-counted,
    /// but could not be handed off because the Extractor→Router mailbox was
    /// full.
    #[inline]
    pub(crate) fn record_dropped_envelope(&self) {
        self.dropped_envelopes.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes an instantaneous, non-atomic snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            extracted: self.extracted.load(Ordering::Relaxed),
            dropped_on_pool_full: self.dropped_on_pool_full.load(Ordering::Relaxed),
            buffer_high_water_mark: self.buffer_high_water_mark.load(Ordering::Relaxed),
            overflow_events: self.overflow_events.load(Ordering::Relaxed),
            overflow_bytes: self.overflow_bytes.load(Ordering::Relaxed),
            corrupt_binary_length: self.corrupt_binary_length.load(Ordering::Relaxed),
            invalid_cog: self.invalid_cog.load(Ordering::Relaxed),
            sink_faults: self.sink_faults.load(Ordering::Relaxed),
            shutdown_leaks: self.shutdown_leaks.load(Ordering::Relaxed),
            dropped_envelopes: self.dropped_envelopes.load(Ordering::Relaxed),
            per_type: std::array::from_fn(|i| self.per_type[i].load(Ordering::Relaxed)),
        }
    }
}

/// A point-in-time, plain-data copy of [`Stats`], returned by `Core::poll_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub extracted: u64,
    pub dropped_on_pool_full: u64,
    pub buffer_high_water_mark: usize,
    pub overflow_events: u64,
    pub overflow_bytes: u64,
    pub corrupt_binary_length: u64,
    pub invalid_cog: u64,
    pub sink_faults: u64,
    pub shutdown_leaks: u64,
    pub dropped_envelopes: u64,
    pub per_type: [u64; KIND_COUNT],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_water_mark_tracks_max() {
        let stats = Stats::new();
        stats.record_ring_occupancy(10);
        stats.record_ring_occupancy(3);
        stats.record_ring_occupancy(42);
        stats.record_ring_occupancy(7);
        assert_eq!(stats.snapshot().buffer_high_water_mark, 42);
    }

    #[test]
    fn per_type_counts_accumulate() {
        let stats = Stats::new();
        stats.record_extracted(0);
        stats.record_extracted(0);
        stats.record_extracted(3);
        let snap = stats.snapshot();
        assert_eq!(snap.extracted, 3);
        assert_eq!(snap.per_type[0], 2);
        assert_eq!(snap.per_type[3], 1);
    }
}
