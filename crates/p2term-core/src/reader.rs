//! Adapter from the serial driver's data callback to the [`ByteRing`]
//! producer side.

use crate::byte_ring::ByteRing;
use crate::metrics::Stats;
use crate::router::EventListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Runs on the serial driver's callback thread. Copies driver-owned bytes
/// into the ring and returns; never blocks, never suspends.
///
/// The driver's buffer is assumed reused after the callback returns, so
/// `on_data` always copies before handing bytes to the ring — `ByteRing`'s
/// own `append` already takes a `&[u8]` and copies internally, so the only
/// copy this adapter itself needs to guarantee is that it doesn't retain the
/// driver's slice past the call.
pub struct Reader {
    ring: Arc<ByteRing>,
    stats: Arc<Stats>,
    listener: Arc<dyn EventListener>,
    quiesced: AtomicBool,
}

impl Reader {
    pub fn new(ring: Arc<ByteRing>, stats: Arc<Stats>, listener: Arc<dyn EventListener>) -> Self {
        Self {
            ring,
            stats,
            listener,
            quiesced: AtomicBool::new(false),
        }
    }

    /// The driver's entry point. Must complete quickly (typical chunks
    /// ~200 bytes, budget ≤0.5 ms) and must not block.
    pub fn on_data(&self, bytes: &[u8]) {
        if self.quiesced.load(Ordering::Acquire) {
            return;
        }
        if bytes.is_empty() {
            return;
        }

        if !self.ring.append(bytes) {
            let dropped = bytes.len();
            self.stats.record_overflow(dropped);
            self.listener.on_overflow(dropped);
            warn!(dropped, "byte ring overflow, chunk discarded");
        }
    }

    /// When `true`, incoming bytes are dropped without being copied — used
    /// during shutdown and golden-sync reset to prevent races with
    /// `ring.clear()`.
    pub fn quiesce(&self, quiesced: bool) {
        self.quiesced.store(quiesced, Ordering::Release);
    }

    pub fn is_quiesced(&self) -> bool {
        self.quiesced.load(Ordering::Acquire)
    }
}
