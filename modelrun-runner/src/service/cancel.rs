//! Cooperative cancellation signal
//!
//! Shared between the runner, which raises it on request, and the driving
//! task, which checks it each time the worker's event stream advances. It
//! never preempts anything: the driving task forwards it to the worker as
//! an interrupt request and the worker decides what to do with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-shot cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    requested: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether the flag is raised, without consuming it
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Consumes the flag; true at most once per request
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// Lowers the flag without observing it
    pub fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}
