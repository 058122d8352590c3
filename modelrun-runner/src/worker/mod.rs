//! Worker collaborator
//!
//! The worker is whatever actually loads and runs the model. The runner only
//! sees it through the [`Worker`] trait: setup and predict each return a
//! finite stream of events, and a running prediction can be interrupted.

mod process;

pub use process::ProcessWorker;

use async_trait::async_trait;
use futures::stream::BoxStream;
use modelrun_core::dto::worker::WorkerEvent;
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;
use thiserror::Error;

/// Ordered events of one setup or predict invocation
pub type EventStream = BoxStream<'static, Result<WorkerEvent, WorkerError>>;

/// Failures of the worker itself, as opposed to failures of model code
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("undecodable worker message {line:?}: {source}")]
    Protocol {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("worker is not running")]
    NotRunning,

    #[error("worker exited before finishing")]
    Exited,
}

/// Executes model code on behalf of the runner
#[async_trait]
pub trait Worker: Send + Sync {
    /// Loads the model; yields `Log` events and ends with `Done`
    fn setup(&self) -> EventStream;

    /// Runs one prediction; yields a heartbeat at least every `poll_interval`
    fn predict(&self, input: Map<String, JsonValue>, poll_interval: Duration) -> EventStream;

    /// Asks the running prediction to stop; best effort
    async fn cancel(&self) -> Result<(), WorkerError>;

    /// Stops the worker for good
    fn terminate(&self);
}
