//! Configuration for the async event bridge.

use std::time::Duration;

/// Tunables for [`crate::bridge`]'s event channel.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Capacity of the bounded event channel between [`p2term_core::EventListener`]
    /// callbacks and the async [`crate::EventStream`]. A full channel drops the
    /// oldest pending notification rather than blocking the core's hot paths.
    pub event_buffer: usize,
    /// How long [`crate::ShutdownSignal::shutdown`] waits for `Core::stop`'s
    /// blocking drain to finish before giving up on the spawned blocking task.
    pub shutdown_wait: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            shutdown_wait: Duration::from_secs(5),
        }
    }
}
