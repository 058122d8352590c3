//! Prediction driver
//!
//! Consumes the worker's event stream for one prediction and translates each
//! event into a state transition on the prediction's response. Between
//! events it checks the cancellation flag and forwards it to the worker.
//!
//! Failures come in two kinds. Problems with what the model produced (an
//! output of the wrong shape, files that can't be uploaded, inputs that
//! can't be downloaded) fail the prediction and end the driver normally.
//! Problems with the worker or with the runner's own bookkeeping fail the
//! prediction and are returned as errors, which the task supervisor treats
//! as fatal for the whole runner.

use anyhow::{Context, Result};
use futures::StreamExt;
use modelrun_client::RemoteFetcher;
use modelrun_core::domain::prediction::{PredictionRequest, PredictionResponse};
use modelrun_core::dto::worker::WorkerEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::service::cancel::CancelFlag;
use crate::service::event_handler::{OutputError, PredictionEventHandler};
use crate::service::inputs::resolve_inputs;
use crate::worker::{EventStream, Worker};

/// Error recorded when the worker's output events don't fit its declared shape
pub const UNEXPECTED_OUTPUT: &str = "Predictor returned unexpected output";

const UNKNOWN_FAILURE: &str = "Prediction failed for an unknown reason";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputShape {
    Single,
    Sequence,
}

/// Everything needed to drive one prediction
pub struct Prediction {
    pub worker: Arc<dyn Worker>,
    pub request: PredictionRequest,
    pub handler: PredictionEventHandler,
    pub should_cancel: CancelFlag,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub poll_interval: Duration,
}

/// Drives a prediction to completion and returns its final state
///
/// On error the prediction has already been marked failed, with the error
/// chain appended to its logs.
pub async fn predict(prediction: Prediction) -> Result<PredictionResponse> {
    let Prediction {
        worker,
        request,
        handler,
        should_cancel,
        fetcher,
        poll_interval,
    } = prediction;

    let driven = drive(
        worker.as_ref(),
        &request,
        &handler,
        &should_cancel,
        fetcher.as_ref(),
        poll_interval,
    )
    .await;

    match driven {
        Ok(()) => Ok(handler.response().snapshot()),
        Err(e) => {
            handler.append_logs(&format!("{:?}\n", e));
            handler.failed(&e.to_string());
            Err(e)
        }
    }
}

async fn drive(
    worker: &dyn Worker,
    request: &PredictionRequest,
    handler: &PredictionEventHandler,
    should_cancel: &CancelFlag,
    fetcher: &dyn RemoteFetcher,
    poll_interval: Duration,
) -> Result<()> {
    let resolved = match resolve_inputs(&request.input, fetcher).await {
        Ok(resolved) => resolved,
        Err(e) => {
            let e = anyhow::Error::new(e).context("Failed to download input");
            handler.append_logs(&format!("{:?}\n", e));
            handler.failed(&format!("{:#}", e));
            warn!(error = %format!("{:#}", e), "failed to download url path from input");
            return Ok(());
        }
    };
    // Downloads are removed once the prediction is over
    let (input, _downloads) = resolved.into_parts();

    let mut events = worker.predict(input, poll_interval);
    let mut shape = None;

    // `Done` ends the prediction even if the stream stays open
    while let Some(event) = events.next().await {
        let event = event.context("Worker event stream failed")?;

        tokio::task::yield_now().await;
        if should_cancel.take() {
            info!("Cancellation requested, interrupting worker");
            worker
                .cancel()
                .await
                .context("Failed to deliver cancellation to worker")?;
        }

        match event {
            WorkerEvent::Heartbeat => {}
            WorkerEvent::Log { message } => handler.append_logs(&message),
            WorkerEvent::OutputType { multi } => {
                if shape.is_some() {
                    handler.failed(UNEXPECTED_OUTPUT);
                    return stop_early(worker, events).await;
                }
                if multi {
                    shape = Some(OutputShape::Sequence);
                    handler.start_output_sequence()?;
                } else {
                    shape = Some(OutputShape::Single);
                }
            }
            WorkerEvent::Output { payload } => {
                let recorded = match shape {
                    Some(OutputShape::Single) => handler.set_output(payload).await,
                    Some(OutputShape::Sequence) => handler.append_output(payload).await,
                    None => {
                        handler.failed(UNEXPECTED_OUTPUT);
                        return stop_early(worker, events).await;
                    }
                };
                match recorded {
                    Ok(()) => {}
                    Err(OutputError::Upload(e)) => {
                        let e = anyhow::Error::new(e);
                        handler.append_logs(&format!("{:?}\n", e));
                        handler.failed(&e.to_string());
                        return stop_early(worker, events).await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            WorkerEvent::Done(done) => {
                if done.canceled {
                    handler.canceled();
                } else if done.error {
                    let detail = done
                        .error_detail
                        .filter(|detail| !detail.trim().is_empty())
                        .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());
                    handler.failed(&detail);
                } else {
                    handler.succeeded();
                }
                return Ok(());
            }
            WorkerEvent::Unknown => warn!("received unexpected event from worker"),
        }
    }

    Ok(())
}

/// Interrupts the worker and discards the rest of its events
///
/// Used once the prediction has already been failed, so nothing the worker
/// still sends changes it.
async fn stop_early(worker: &dyn Worker, mut events: EventStream) -> Result<()> {
    worker
        .cancel()
        .await
        .context("Failed to deliver cancellation to worker")?;

    while let Some(event) = events.next().await {
        match event.context("Worker event stream failed")? {
            WorkerEvent::Done(_) => break,
            other => debug!("Discarding {:?} after prediction stopped", other),
        }
    }
    Ok(())
}
