use crate::error::Tier;
use crate::invariants::debug_assert_golden_sync_after_dispatch;
use crate::mailbox::Mailbox;
use crate::message::{MessageType, NameId, RouteKey};
use crate::metrics::Stats;
use crate::slot::{ReadHandle, SlotId, SlotPool};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::error;

/// A registered handler, invoked once per dispatched message of a type it
/// was registered for. Plain function-and-context rather than a trait
/// object hierarchy — a sink is "whatever closure the caller gave us",
/// nothing more.
pub type SinkFn = Box<dyn for<'a> Fn(ReadHandle<'a>) + Send + Sync>;

/// Notifications for conditions a sink cannot itself observe: buffer
/// overflow, pool exhaustion, golden sync, and the two fault conditions a
/// misbehaving sink or a stuck shutdown can produce.
pub trait EventListener: Send + Sync {
    fn on_overflow(&self, _dropped: usize) {}
    fn on_pool_exhausted(&self, _tier: Tier) {}
    fn on_golden_sync(&self) {}
    fn on_sink_fault(&self, _message_type: MessageType) {}
    fn on_shutdown_leak(&self, _leaked: usize) {}
    /// The Extractor→Router mailbox was full; a classified, fanout-counted
    /// message was dropped rather than handed off.
    fn on_mailbox_full(&self, _message_type: MessageType) {}
}

/// A no-op listener, used when the embedder doesn't care to observe these
/// events.
pub struct NullEventListener;
impl EventListener for NullEventListener {}

/// Interns `WindowUpdateNamed` target names so [`MessageType`] can stay
/// `Copy`. Shared by the Extractor (interns at classification time) and the
/// Router (resolves at dispatch time).
#[derive(Default)]
pub struct NameTable {
    inner: Mutex<NameTableInner>,
}

#[derive(Default)]
struct NameTableInner {
    names: Vec<String>,
    by_name: HashMap<String, NameId>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> NameId {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.by_name.get(name) {
            return *id;
        }
        let id = NameId(inner.names.len() as u32);
        inner.names.push(name.to_string());
        inner.by_name.insert(name.to_string(), id);
        id
    }

    pub fn resolve(&self, id: NameId) -> String {
        let inner = self.inner.lock().unwrap();
        inner.names[id.0 as usize].clone()
    }
}

/// Envelope the Extractor hands to the Router through the wait-free
/// mailbox: just enough to look the message back up in the pool.
#[derive(Debug, Clone, Copy)]
pub struct RouterEnvelope {
    pub slot_id: SlotId,
    pub message_type: MessageType,
}

/// Exact-key dispatch table: which sinks receive which message, keyed by the
/// message's full [`RouteKey`] (COG index / window kind / window name
/// included, not just the outer `MessageType` variant) so a sink registered
/// for one COG or one window never observes another's traffic.
pub struct RouteTable {
    by_key: Mutex<HashMap<RouteKey, Vec<SinkFn>>>,
    names: NameTable,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            by_key: Mutex::new(HashMap::new()),
            names: NameTable::new(),
        }
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Registers a sink for messages matching `message_type` exactly — same
    /// outer variant *and* same COG index / window kind, where applicable.
    pub fn register_sink(&self, message_type: MessageType, sink: SinkFn) {
        self.by_key
            .lock()
            .unwrap()
            .entry(message_type.route_key())
            .or_default()
            .push(sink);
    }

    /// Registers a sink that only receives `WindowUpdateNamed` messages
    /// targeting this specific window name.
    pub fn register_named_window_sink(&self, name: &str, sink: SinkFn) {
        let id = self.names.intern(name);
        self.by_key
            .lock()
            .unwrap()
            .entry(RouteKey::WindowUpdateNamed(id))
            .or_default()
            .push(sink);
    }

    /// Number of sinks that will receive a message of this exact type — the
    /// fanout count the Extractor publishes the slot with.
    pub(crate) fn fanout_count(&self, message_type: MessageType) -> u32 {
        self.by_key
            .lock()
            .unwrap()
            .get(&message_type.route_key())
            .map_or(0, Vec::len) as u32
    }

    /// Invokes every sink registered for this exact message, in registration
    /// order, handing each a fresh `ReadHandle` into the same slot.
    fn for_each_sink<F: FnMut(&SinkFn)>(&self, message_type: MessageType, mut f: F) {
        if let Some(sinks) = self.by_key.lock().unwrap().get(&message_type.route_key()) {
            for sink in sinks {
                f(sink);
            }
        }
    }
}

/// Type-indexed dispatch with atomic refcount fan-out to registered sinks.
///
/// The Router does not itself set a slot's ref_count — the Extractor does
/// that at publish time using [`RouteTable::fanout_count`] (computed through
/// the same shared table) — the Router only invokes sinks and releases the
/// slot's reference on a sink's behalf if that sink panics.
pub struct Router {
    table: Arc<RouteTable>,
    pool: Arc<SlotPool>,
    mailbox: Arc<Mailbox<RouterEnvelope>>,
    listener: Arc<dyn EventListener>,
    stats: Arc<Stats>,
}

impl Router {
    pub fn new(
        table: Arc<RouteTable>,
        pool: Arc<SlotPool>,
        mailbox: Arc<Mailbox<RouterEnvelope>>,
        listener: Arc<dyn EventListener>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            table,
            pool,
            mailbox,
            listener,
            stats,
        }
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Drains up to `max` envelopes from the mailbox, dispatching each to
    /// its registered sinks. Returns the number dispatched.
    pub fn drain(&self, max: usize) -> usize {
        let mut n = 0;
        while n < max {
            match self.mailbox.try_recv() {
                Some(envelope) => {
                    self.dispatch(envelope);
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn dispatch(&self, envelope: RouterEnvelope) {
        let RouterEnvelope { slot_id, message_type } = envelope;
        let mut dispatched_to_any = false;

        self.table.for_each_sink(message_type, |sink| {
            let handle = self.pool.read(slot_id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| sink(handle)));
            dispatched_to_any = true;
            if result.is_err() {
                error!(kind = message_type.kind_name(), "sink panicked during dispatch");
                self.stats.record_sink_fault();
                self.listener.on_sink_fault(message_type);
                self.pool.release(slot_id);
            }
        });
        // Routing for this envelope has now run, whether or not any sink was
        // registered for it — this is what invariant 7 checks against, not
        // whether a sink happened to exist.
        let routed = true;

        if !dispatched_to_any {
            // Nothing was registered for this type; the Extractor already
            // published with fanout 0, but still holds one placeholder
            // reference on our behalf.
            self.pool.release(slot_id);
        }

        if matches!(message_type, MessageType::P2SystemInit) {
            debug_assert_golden_sync_after_dispatch!(routed);
            self.listener.on_golden_sync();
        }
    }

}

pub(crate) fn fanout_for(table: &RouteTable, message_type: MessageType) -> u32 {
    table.fanout_count(message_type)
}
