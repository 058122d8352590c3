//! Worker setup
//!
//! Runs the worker's one-time setup, collecting its logs. Whatever goes
//! wrong here ends up in the returned [`SetupResult`] as a failed status;
//! the caller decides what a failed setup means for the process.

use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use modelrun_core::domain::prediction::Status;
use modelrun_core::domain::setup::SetupResult;
use modelrun_core::dto::worker::WorkerEvent;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::probes::ReadinessProbe;
use crate::worker::Worker;

/// Log line appended when the worker ends setup without reporting an outcome
pub const MISSING_DONE: &str = "Error: did not receive 'done' event from setup!";

pub async fn setup(worker: Arc<dyn Worker>, probe: Arc<dyn ReadinessProbe>) -> Result<SetupResult> {
    let started_at = Utc::now();
    let mut logs = String::new();
    let mut status = None;

    let mut events = worker.setup();
    while let Some(event) = events.next().await {
        tokio::task::yield_now().await;

        match event {
            Ok(WorkerEvent::Log { message }) => logs.push_str(&message),
            Ok(WorkerEvent::Done(done)) => {
                status = Some(if done.error {
                    Status::Failed
                } else {
                    Status::Succeeded
                });
            }
            Ok(other) => debug!("Ignoring {:?} during setup", other),
            Err(e) => {
                let e = anyhow::Error::new(e).context("Worker setup failed");
                push_line(&mut logs, &format!("{:?}", e));
                status = Some(Status::Failed);
                break;
            }
        }
    }

    let status = status.unwrap_or_else(|| {
        push_line(&mut logs, MISSING_DONE);
        Status::Failed
    });

    if status == Status::Succeeded {
        info!("Setup succeeded");
        probe.ready();
    } else {
        warn!("Setup failed");
    }

    Ok(SetupResult {
        started_at,
        completed_at: Utc::now(),
        logs,
        status,
    })
}

/// Appends a line, starting it on a fresh line if needed
fn push_line(logs: &mut String, line: &str) {
    if !logs.is_empty() && !logs.ends_with('\n') {
        logs.push('\n');
    }
    logs.push_str(line);
    logs.push('\n');
}
