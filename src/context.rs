//! Advisory cancellation for repository operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Context threaded through cleanup passes and pre-remove hooks.
///
/// Cancellation is cooperative: hooks may check it, and a cleanup sweep stops
/// visiting new entries once it is set. Work already started is never rolled
/// back, and anything left over is garbage for the next sweep.
///
/// Only library callers cancel a context. The `fleetrepo` binary installs no
/// signal handler; an interrupted process simply stops, which every
/// transition already tolerates.
#[derive(Clone, Debug, Default)]
pub struct OperationContext {
    cancelled: Arc<AtomicBool>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Visible to every clone of this context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
