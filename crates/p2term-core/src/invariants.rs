//! Debug assertion macros for the core's invariants.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]`); zero overhead
//! in release builds.

/// Ring item count never exceeds capacity.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "ring count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Head/tail sequence numbers only ever increase.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// Consumer never reads past the producer's committed tail.
macro_rules! debug_assert_head_not_past_tail {
    ($new_head:expr, $tail:expr) => {
        debug_assert!(
            $new_head <= $tail,
            "advancing head {} beyond tail {}",
            $new_head,
            $tail
        )
    };
}

/// A slot's ref_count transitions 0 -> n exactly once before any release.
macro_rules! debug_assert_refcount_published_once {
    ($prev:expr) => {
        debug_assert!(
            $prev == 0,
            "slot published while ref_count was already {} (expected 0)",
            $prev
        )
    };
}

/// A slot must not be re-acquired while still referenced by a sink.
macro_rules! debug_assert_slot_free_before_acquire {
    ($refcount:expr) => {
        debug_assert!(
            $refcount == 0,
            "acquired a slot with nonzero ref_count {}",
            $refcount
        )
    };
}

/// `GoldenSyncEvent` may only be emitted after the triggering message itself
/// was routed to its sinks.
macro_rules! debug_assert_golden_sync_after_dispatch {
    ($dispatched:expr) => {
        debug_assert!(
            $dispatched,
            "golden sync event emitted before the triggering message was dispatched"
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_golden_sync_after_dispatch;
pub(crate) use debug_assert_head_not_past_tail;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_refcount_published_once;
pub(crate) use debug_assert_slot_free_before_acquire;
