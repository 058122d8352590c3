//! Shared prediction state
//!
//! The response of the prediction currently being driven is shared by
//! reference between the driving task, which is its only writer, and the
//! caller that submitted it, which only reads. Callers see live progress by
//! reading the handle, not by polling a copy.

use modelrun_core::domain::prediction::PredictionResponse;
use std::sync::{Arc, PoisonError, RwLock};

/// Reference-counted handle to a live prediction response
#[derive(Debug, Clone)]
pub struct PredictionHandle {
    inner: Arc<RwLock<PredictionResponse>>,
}

impl PredictionHandle {
    pub fn new(response: PredictionResponse) -> Self {
        Self {
            inner: Arc::new(RwLock::new(response)),
        }
    }

    /// Returns a copy of the current state
    pub fn snapshot(&self) -> PredictionResponse {
        self.read(Clone::clone)
    }

    /// Reads the current state without copying it
    pub fn read<R>(&self, f: impl FnOnce(&PredictionResponse) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Identity copied from the request
    pub fn id(&self) -> Option<String> {
        self.read(|response| response.id.clone())
    }

    /// Whether two handles point at the same response
    pub fn ptr_eq(&self, other: &PredictionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Mutates the shared state; reserved for the driving task
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut PredictionResponse) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
