//! Delivery pipeline
//!
//! Side effects triggered while a prediction's events are translated:
//! webhook notifications filtered by the caller's event tags, and
//! externalization of output files to a remote store.

pub mod externalize;
mod notifier;

pub use externalize::externalize;
pub use notifier::Notifier;
