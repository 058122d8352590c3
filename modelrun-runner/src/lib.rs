//! Modelrun Runner
//!
//! Drives a model worker through its one-time setup and then through
//! predictions, one at a time, turning the worker's event stream into a
//! live prediction response that callers and webhooks observe.
//!
//! Architecture:
//! - Worker: the process running model code, spoken to over JSON lines
//! - Services: setup, input preparation and the event translator
//! - Delivery: webhook notifications and output file uploads
//! - Scheduler: single-slot admission, cancellation and task supervision

pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod probes;
pub mod scheduler;
pub mod service;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use context::PredictionHandle;
pub use error::{FileUploadError, RunnerError};
pub use scheduler::{Collaborators, PredictionRunner, RunnerSettings, TaskHandle, TaskOutcome};
pub use worker::{ProcessWorker, Worker, WorkerError};
