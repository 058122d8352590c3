//! Scheduler layer for the runner
//!
//! Admission control for setup and predictions, and supervision of the
//! background tasks that drive them.

pub mod runner;
pub mod task;

pub use runner::{Collaborators, PredictionRunner, RunnerSettings};
pub use task::{TaskHandle, TaskOutcome};
