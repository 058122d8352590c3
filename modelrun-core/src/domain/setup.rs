//! Setup domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::prediction::Status;

/// Outcome of the one-time worker setup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupResult {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub logs: String,
    /// Either `Succeeded` or `Failed`
    pub status: Status,
}

impl SetupResult {
    pub fn succeeded(&self) -> bool {
        self.status == Status::Succeeded
    }
}
