//! The control plane: wires Reader, Extractor, Router and SlotPool into one
//! running pipeline, and owns the golden-sync reset choreography.

use crate::byte_ring::ByteRing;
use crate::config::CoreConfig;
use crate::error::Tier;
use crate::extractor::Extractor;
use crate::mailbox::Mailbox;
use crate::message::MessageType;
use crate::metrics::{Stats, StatsSnapshot};
use crate::reader::Reader;
use crate::router::{EventListener, RouteTable, Router, RouterEnvelope, SinkFn};
use crate::slot::{SlotId, SlotPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Forwards every [`EventListener`] callback to the embedder's own listener,
/// except `on_golden_sync`, which it intercepts to run the quiesce/clear/
/// resume sequence on the owning [`Core`] before forwarding.
struct GoldenSyncListener {
    core: Weak<CoreInner>,
    user: Arc<dyn EventListener>,
}

impl EventListener for GoldenSyncListener {
    fn on_overflow(&self, dropped: usize) {
        self.user.on_overflow(dropped);
    }

    fn on_pool_exhausted(&self, tier: Tier) {
        self.user.on_pool_exhausted(tier);
    }

    fn on_golden_sync(&self) {
        if let Some(core) = self.core.upgrade() {
            core.run_golden_sync();
        }
        self.user.on_golden_sync();
    }

    fn on_sink_fault(&self, message_type: MessageType) {
        self.user.on_sink_fault(message_type);
    }

    fn on_shutdown_leak(&self, leaked: usize) {
        self.user.on_shutdown_leak(leaked);
    }

    fn on_mailbox_full(&self, message_type: MessageType) {
        self.user.on_mailbox_full(message_type);
    }
}

struct CoreInner {
    config: CoreConfig,
    ring: Arc<ByteRing>,
    pool: Arc<SlotPool>,
    route_table: Arc<RouteTable>,
    #[allow(dead_code)]
    mailbox: Arc<Mailbox<RouterEnvelope>>,
    stats: Arc<Stats>,
    reader: Reader,
    extractor: Arc<Extractor>,
    router: Arc<Router>,
    extractor_handle: Mutex<Option<thread::JoinHandle<()>>>,
    router_handle: Mutex<Option<thread::JoinHandle<()>>>,
    router_shutdown: AtomicBool,
}

impl CoreInner {
    /// Quiesce Reader, pause Extractor, drop unread bytes, resume Extractor,
    /// un-quiesce Reader. The Extractor carries no state across calls to
    /// `try_extract_one` other than the ring's own read position, so
    /// "reset parser state" reduces to `ring.clear()`.
    fn run_golden_sync(&self) {
        info!("golden sync: quiescing reader and clearing ring");
        self.reader.quiesce(true);
        self.extractor.pause();
        self.ring.clear();
        self.extractor.resume();
        self.reader.quiesce(false);
    }
}

/// Ties the Reader, Extractor, Router and SlotPool into one running
/// pipeline and exposes the embedder-facing API.
pub struct Core {
    inner: Arc<CoreInner>,
}

impl Core {
    /// Builds a new, not-yet-started core. The embedder registers sinks
    /// against it before calling [`Core::start`].
    pub fn new(config: CoreConfig, listener: Arc<dyn EventListener>) -> Arc<Self> {
        let ring = Arc::new(ByteRing::new(config.ring_capacity()));
        let pool = Arc::new(SlotPool::new(&config));
        let route_table = Arc::new(RouteTable::new());
        let mailbox = Arc::new(Mailbox::new(config.mailbox_capacity()));
        let stats = Arc::new(Stats::new());

        let inner = Arc::new_cyclic(|weak: &Weak<CoreInner>| {
            let golden_sync_listener: Arc<dyn EventListener> = Arc::new(GoldenSyncListener {
                core: weak.clone(),
                user: listener,
            });

            let reader = Reader::new(ring.clone(), stats.clone(), golden_sync_listener.clone());
            let extractor = Arc::new(Extractor::new(
                ring.clone(),
                pool.clone(),
                route_table.clone(),
                mailbox.clone(),
                stats.clone(),
                golden_sync_listener.clone(),
                config,
            ));
            let router = Arc::new(Router::new(
                route_table.clone(),
                pool.clone(),
                mailbox.clone(),
                golden_sync_listener,
                stats.clone(),
            ));

            CoreInner {
                config,
                ring,
                pool,
                route_table,
                mailbox,
                stats,
                reader,
                extractor,
                router,
                extractor_handle: Mutex::new(None),
                router_handle: Mutex::new(None),
                router_shutdown: AtomicBool::new(false),
            }
        });

        Arc::new(Self { inner })
    }

    /// Registers a sink for messages matching `message_type` exactly — same
    /// outer variant *and* same COG index or window kind, where the variant
    /// carries one. A sink registered for `CogMessage { cog: 3 }` only ever
    /// observes COG 3's traffic, never COG 1's. Call before [`Core::start`];
    /// registration itself is thread-safe at any time, but messages framed
    /// before a sink is registered never reach it.
    pub fn register_sink(&self, message_type: MessageType, sink: SinkFn) {
        self.inner.route_table.register_sink(message_type, sink);
    }

    /// Registers a sink for `WindowUpdateNamed` messages targeting this one
    /// window name. Dynamic; safe to call after `start`.
    pub fn register_named_window_sink(&self, name: &str, sink: SinkFn) {
        self.inner.route_table.register_named_window_sink(name, sink);
    }

    /// Spawns the Extractor's and Router's background threads.
    pub fn start(&self) {
        let extractor = self.inner.extractor.clone();
        *self.inner.extractor_handle.lock().unwrap() = Some(extractor.spawn());

        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name("p2term-router".into())
            .spawn(move || {
                while !inner.router_shutdown.load(Ordering::Acquire) {
                    let n = inner.router.drain(inner.config.extractor_batch_cap);
                    if n == 0 {
                        thread::park_timeout(inner.config.extractor_idle_park);
                    }
                }
                // Final drain so messages framed right before shutdown
                // still reach their sinks instead of being silently stranded.
                inner.router.drain(usize::MAX);
            })
            .expect("failed to spawn router thread");
        *self.inner.router_handle.lock().unwrap() = Some(handle);
    }

    /// Signals both background threads to stop and waits, up to
    /// `config.drain_timeout`, for all in-flight slots to reach ref_count 0.
    /// Logs a `ShutdownLeak` event and returns rather than hanging if the
    /// timeout elapses with slots still live.
    pub fn stop(&self) {
        self.inner.extractor.request_shutdown();
        self.inner.router_shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.inner.extractor_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.inner.router_handle.lock().unwrap().take() {
            let _ = handle.join();
        }

        let deadline = Instant::now() + self.inner.config.drain_timeout;
        loop {
            let live = self.inner.pool.live_count();
            if live == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(leaked = live, "shutdown timed out with slots still live");
                self.inner.stats.record_shutdown_leak(live);
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// The Reader's entry point: copies driver-owned bytes into the ring.
    /// Must complete quickly and never block; safe to call from the serial
    /// driver's own callback thread.
    pub fn on_serial_bytes(&self, bytes: &[u8]) {
        self.inner.reader.on_data(bytes);
    }

    /// An atomic snapshot of every instrumentation counter.
    pub fn poll_stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Returns a slot reference a sink is done with. Must be called exactly
    /// once per dispatch a sink observed (see [`crate::slot::ReadHandle::slot_id`]).
    pub fn release(&self, slot_id: SlotId) {
        self.inner.pool.release(slot_id);
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::NullEventListener;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cog_message_reaches_registered_sink_end_to_end() {
        let core = Core::new(CoreConfig::default(), Arc::new(NullEventListener));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_sink = seen.clone();
        let core_for_sink = core.clone();
        core.register_sink(
            MessageType::CogMessage { cog: 3 },
            Box::new(move |handle| {
                assert_eq!(handle.data(), b"Cog3  hi\r\n");
                core_for_sink.release(handle.slot_id());
                seen_in_sink.fetch_add(1, Ordering::Relaxed);
            }),
        );

        core.start();
        core.on_serial_bytes(b"Cog3  hi\r\n");

        let deadline = Instant::now() + Duration::from_secs(1);
        while seen.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(seen.load(Ordering::Relaxed), 1);

        core.stop();
    }

    #[test]
    fn golden_sync_marker_clears_ring_and_notifies_listener() {
        struct Listener {
            golden_syncs: Arc<AtomicUsize>,
        }
        impl EventListener for Listener {
            fn on_golden_sync(&self) {
                self.golden_syncs.fetch_add(1, Ordering::Relaxed);
            }
        }

        let golden_syncs = Arc::new(AtomicUsize::new(0));
        let core = Core::new(
            CoreConfig::default(),
            Arc::new(Listener { golden_syncs: golden_syncs.clone() }),
        );
        core.start();
        core.on_serial_bytes(b"Cog0 INIT $0000_0000 $0000_0000 load\n");

        let deadline = Instant::now() + Duration::from_secs(1);
        while golden_syncs.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(golden_syncs.load(Ordering::Relaxed), 1);

        core.stop();
    }

    #[test]
    fn stop_is_idempotent_with_no_live_slots() {
        let core = Core::new(CoreConfig::default(), Arc::new(NullEventListener));
        core.start();
        core.stop();
    }
}
