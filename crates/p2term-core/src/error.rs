use thiserror::Error;

/// The slot-size tier a `PoolExhausted` failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// 256-byte slots, sized for binary debug packets.
    Tier0,
    /// 4096-byte slots, sized for typical text lines.
    Tier1,
    /// 65536-byte slots, sized for worst-case window payloads.
    Tier2,
}

/// Error taxonomy for the ingest core.
///
/// Only the non-hot-path operations return these as `Result`; on the
/// Reader/Extractor hot paths the same kinds surface instead as counters
/// and [`crate::EventListener`] callbacks, never as a propagated `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The `ByteRing` had no space for incoming bytes; they were dropped.
    #[error("byte ring overflow, {dropped} bytes dropped")]
    Overflow {
        /// Number of bytes dropped in this overflow event.
        dropped: usize,
    },
    /// `SlotPool::acquire` exhausted its retry budget for the given tier.
    #[error("slot pool exhausted for {tier:?}")]
    PoolExhausted {
        /// Which tier was exhausted.
        tier: Tier,
    },
    /// A `BinaryDebugPacket` header declared a length outside the accepted range.
    #[error("corrupt binary debug packet length: {declared}")]
    CorruptBinaryLength {
        /// The length byte(s) as declared by the packet header.
        declared: usize,
    },
    /// A `CogMessage`/`DebuggerFrame` named a COG index outside 0..=7.
    #[error("invalid cog index: {cog}")]
    InvalidCog {
        /// The offending cog index.
        cog: u8,
    },
    /// A sink panicked during dispatch; its slot reference was force-released.
    #[error("sink fault during dispatch")]
    SinkFault,
    /// `Core::stop` timed out with slots still holding a nonzero ref_count.
    #[error("shutdown timed out with {leaked} slot(s) still live")]
    ShutdownLeak {
        /// Number of slots that failed to drain before the timeout.
        leaked: usize,
    },
}
