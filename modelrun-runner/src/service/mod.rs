//! Service layer
//!
//! The work done inside the runner's background tasks: worker setup,
//! preparing inputs, and translating a prediction's worker events into
//! state transitions on its response.

pub mod cancel;
pub mod event_handler;
pub mod inputs;
pub mod predict;
pub mod setup;

pub use cancel::CancelFlag;
pub use event_handler::{OutputError, PredictionEventHandler};
pub use predict::{Prediction, UNEXPECTED_OUTPUT, predict};
pub use setup::{MISSING_DONE, setup};
