//! Async `Stream`/shutdown bridge over [`p2term_core::Core`]'s synchronous API.
//!
//! This is a thin ergonomic wrapper, not a second implementation: it
//! registers a [`p2term_core::EventListener`] that forwards callbacks onto a
//! channel, and wraps `Core::stop` in a cloneable [`ShutdownSignal`]. It
//! introduces no new framing, classification or routing semantics. There is
//! no `Sink`/backpressure side, unlike the producer half of the crate this
//! is modeled on — the core has no async producer; bytes arrive
//! synchronously from the driver callback via `Core::on_serial_bytes`, which
//! must never await or block.

mod config;
mod events;
mod shutdown;
mod stream;

pub use config::BridgeConfig;
pub use events::CoreEvent;
pub use shutdown::ShutdownSignal;
pub use stream::EventStream;

use p2term_core::{Core, CoreConfig};
use std::sync::Arc;

/// Builds a [`Core`] wired to an async event bridge: sinks are registered on
/// the returned `Arc<Core>` as usual, then `Core::start()` is called by the
/// embedder once registration is complete, exactly as in the synchronous
/// API. The returned [`EventStream`] yields every `EventListener` callback
/// the core emits from then on, and the returned [`ShutdownSignal`] triggers
/// `Core::stop()` from any task.
pub fn bridge(config: CoreConfig, bridge_config: BridgeConfig) -> (Arc<Core>, EventStream, ShutdownSignal) {
    let (tx, rx) = tokio::sync::mpsc::channel(bridge_config.event_buffer);
    let listener = Arc::new(events::ChannelEventListener::new(tx));
    let core = Core::new(config, listener);
    let signal = ShutdownSignal::new(core.clone());
    (core, EventStream::new(rx), signal)
}
