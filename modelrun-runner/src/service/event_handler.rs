//! Prediction state transitions
//!
//! [`PredictionEventHandler`] owns every mutation of a prediction's shared
//! response while it runs: status, output, logs, timestamps and metrics.
//! Each transition fires the matching webhook through the notifier.

use chrono::Utc;
use modelrun_client::FileUploader;
use modelrun_core::domain::prediction::{Metrics, Status, WebhookEvent};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::context::PredictionHandle;
use crate::delivery::{Notifier, externalize};
use crate::error::FileUploadError;

/// Why an output could not be recorded
#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Upload(#[from] FileUploadError),

    #[error("Predictor unexpectedly returned multiple outputs")]
    AlreadySet,

    #[error("Cannot append output before setting output")]
    NotASequence,
}

/// Applies translated worker events to a prediction response
pub struct PredictionEventHandler {
    response: PredictionHandle,
    notifier: Notifier,
    uploader: Option<Arc<dyn FileUploader>>,
}

impl PredictionEventHandler {
    /// Marks the prediction as processing and sends the `start` webhook
    ///
    /// With `skip_start_event` the `start` webhook is not sent, so the
    /// first webhook a caller sees is a real output and isn't throttled.
    pub fn new(
        response: PredictionHandle,
        notifier: Notifier,
        uploader: Option<Arc<dyn FileUploader>>,
        skip_start_event: bool,
    ) -> Self {
        info!("starting prediction");

        response.update(|p| {
            p.status = Some(Status::Processing);
            p.output = None;
            p.logs = Some(String::new());
            p.started_at = Some(Utc::now());
        });

        let handler = Self {
            response,
            notifier,
            uploader,
        };

        if !skip_start_event {
            handler.send_webhook(WebhookEvent::Start);
        }

        handler
    }

    pub fn response(&self) -> &PredictionHandle {
        &self.response
    }

    /// Records the only output of a single-output prediction
    ///
    /// No webhook is sent; callers learn about it from `completed`.
    pub async fn set_output(&self, output: JsonValue) -> Result<(), OutputError> {
        if self.response.read(|p| p.output.is_some()) {
            return Err(OutputError::AlreadySet);
        }

        let output = self.upload_files(output).await?;
        self.response.update(|p| p.output = Some(output));
        Ok(())
    }

    /// Starts an empty output sequence
    pub fn start_output_sequence(&self) -> Result<(), OutputError> {
        self.response.update(|p| {
            if p.output.is_some() {
                return Err(OutputError::AlreadySet);
            }
            p.output = Some(JsonValue::Array(Vec::new()));
            Ok(())
        })
    }

    /// Appends one element to the output sequence
    pub async fn append_output(&self, output: JsonValue) -> Result<(), OutputError> {
        if !self
            .response
            .read(|p| matches!(p.output, Some(JsonValue::Array(_))))
        {
            return Err(OutputError::NotASequence);
        }

        let output = self.upload_files(output).await?;
        self.response.update(|p| {
            if let Some(JsonValue::Array(items)) = &mut p.output {
                items.push(output);
            }
        });

        self.send_webhook(WebhookEvent::Output);
        Ok(())
    }

    pub fn append_logs(&self, logs: &str) {
        self.response
            .update(|p| p.logs.get_or_insert_with(String::new).push_str(logs));
        self.send_webhook(WebhookEvent::Logs);
    }

    pub fn succeeded(&self) {
        info!("prediction succeeded");
        self.complete(Status::Succeeded, None);
    }

    pub fn failed(&self, error: &str) {
        info!(error, "prediction failed");
        let error = if error.trim().is_empty() {
            "Prediction failed for an unknown reason"
        } else {
            error
        };
        self.complete(Status::Failed, Some(error.to_string()));
    }

    pub fn canceled(&self) {
        info!("prediction canceled");
        self.complete(Status::Canceled, None);
    }

    fn complete(&self, status: Status, error: Option<String>) {
        let applied = self.response.update(|p| {
            if p.is_terminal() {
                return Err(p.status);
            }

            let completed_at = Utc::now();
            p.status = Some(status);
            p.error = error;
            p.completed_at = Some(completed_at);

            if status == Status::Succeeded {
                let predict_time = p
                    .started_at
                    .and_then(|started_at| (completed_at - started_at).to_std().ok())
                    .map(|elapsed| elapsed.as_secs_f64())
                    .unwrap_or_default();
                p.metrics = Some(Metrics { predict_time });
            }
            Ok(())
        });

        match applied {
            Ok(()) => self.send_webhook(WebhookEvent::Completed),
            Err(Some(current)) => warn!(
                "Ignoring transition to {}: prediction already {}",
                status, current
            ),
            Err(None) => {}
        }
    }

    fn send_webhook(&self, event: WebhookEvent) {
        self.response.read(|p| self.notifier.notify(p, event));
    }

    async fn upload_files(&self, output: JsonValue) -> Result<JsonValue, FileUploadError> {
        match &self.uploader {
            Some(uploader) => externalize(output, uploader.as_ref()).await,
            None => Ok(output),
        }
    }
}
