//! A plain-data mirror of [`p2term_core::EventListener`]'s callbacks, carried
//! across the sync/async boundary by a channel.

use p2term_core::{EventListener, MessageType, Tier};
use tokio::sync::mpsc::Sender;
use tracing::warn;

/// One core-level notification, queued for the async side to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreEvent {
    Overflow { dropped: usize },
    PoolExhausted { tier: Tier },
    GoldenSync,
    SinkFault { message_type: MessageType },
    ShutdownLeak { leaked: usize },
}

/// Implements [`EventListener`] by forwarding each callback onto a bounded
/// channel. Registered with `p2term_core::Core::new` in place of the
/// embedder's own listener; `bridge()` hands the embedder the receiving
/// end as an [`crate::EventStream`] instead.
///
/// Uses `try_send` rather than `blocking_send`: an `EventListener` callback
/// runs on whichever thread produced the event (the Extractor or Router
/// background thread), which must never block.
pub(crate) struct ChannelEventListener {
    tx: Sender<CoreEvent>,
}

impl ChannelEventListener {
    pub(crate) fn new(tx: Sender<CoreEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: CoreEvent) {
        if self.tx.try_send(event).is_err() {
            warn!(?event, "event bridge channel full or closed, notification dropped");
        }
    }
}

impl EventListener for ChannelEventListener {
    fn on_overflow(&self, dropped: usize) {
        self.send(CoreEvent::Overflow { dropped });
    }

    fn on_pool_exhausted(&self, tier: Tier) {
        self.send(CoreEvent::PoolExhausted { tier });
    }

    fn on_golden_sync(&self) {
        self.send(CoreEvent::GoldenSync);
    }

    fn on_sink_fault(&self, message_type: MessageType) {
        self.send(CoreEvent::SinkFault { message_type });
    }

    fn on_shutdown_leak(&self, leaked: usize) {
        self.send(CoreEvent::ShutdownLeak { leaked });
    }
}
