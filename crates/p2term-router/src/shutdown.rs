//! Graceful shutdown, triggerable from any task.

use p2term_core::Core;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ShutdownState {
    initiated: AtomicBool,
}

/// A cloneable handle that triggers `Core::stop()` from any task.
///
/// Idempotent: only the first call actually stops the core; later clones
/// calling `shutdown()` after that observe `is_shutdown() == true` and do
/// nothing further.
#[derive(Clone)]
pub struct ShutdownSignal {
    core: Arc<Core>,
    state: Arc<ShutdownState>,
}

impl ShutdownSignal {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            state: Arc::new(ShutdownState {
                initiated: AtomicBool::new(false),
            }),
        }
    }

    /// Stops the core's background threads and waits for the bounded drain.
    /// `Core::stop` blocks the calling thread (it joins the Extractor and
    /// Router threads), so this is run on a blocking task rather than
    /// awaited directly on the async executor's own threads.
    pub async fn shutdown(&self) {
        if self.state.initiated.swap(true, Ordering::AcqRel) {
            return;
        }
        let core = self.core.clone();
        let _ = tokio::task::spawn_blocking(move || core.stop()).await;
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.initiated.load(Ordering::Acquire)
    }
}
