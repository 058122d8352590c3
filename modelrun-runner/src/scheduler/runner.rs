//! Prediction runner
//!
//! Admits at most one unit of work at a time (the worker setup or a single
//! prediction) and runs it as a supervised background task. Callers get a
//! live handle to the prediction's response and a handle to the task.
//!
//! The runner itself is plain synchronous state behind `&mut self`. A front
//! end serving concurrent requests wraps it in a mutex; all the waiting
//! happens on the returned task handles, never while holding the runner.

use anyhow::Result;
use modelrun_client::{
    FileUploader, HttpFetcher, RemoteFetcher, SignedUrlUploader, WebhookClient, WebhookConfig,
    WebhookSender,
};
use modelrun_core::domain::prediction::{PredictionRequest, PredictionResponse};
use modelrun_core::domain::setup::SetupResult;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::Config;
use crate::context::PredictionHandle;
use crate::delivery::Notifier;
use crate::error::RunnerError;
use crate::probes::{FileReadinessProbe, ReadinessProbe};
use crate::scheduler::task::{TaskHandle, spawn_supervised};
use crate::service::{CancelFlag, Prediction, PredictionEventHandler, predict, setup};
use crate::worker::Worker;

/// External services the runner talks to
#[derive(Clone)]
pub struct Collaborators {
    pub webhooks: Arc<dyn WebhookSender>,
    /// Output file store; output files stay local paths without one
    pub uploader: Option<Arc<dyn FileUploader>>,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub probe: Arc<dyn ReadinessProbe>,
}

impl Collaborators {
    /// Builds the HTTP-backed collaborators
    ///
    /// Must be called inside a Tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let webhooks = WebhookClient::new(WebhookConfig {
            request_timeout: config.webhook_timeout,
            throttle_interval: config.throttle_response_interval,
        })?;

        let uploader = match &config.upload_url {
            Some(url) => {
                info!("Uploading output files to {}", url);
                Some(Arc::new(SignedUrlUploader::new(url.clone())?) as Arc<dyn FileUploader>)
            }
            None => None,
        };

        Ok(Self {
            webhooks: Arc::new(webhooks),
            uploader,
            fetcher: Arc::new(HttpFetcher::new()?),
            probe: Arc::new(FileReadinessProbe::new(config.ready_file.clone())),
        })
    }
}

/// Per-prediction behavior knobs
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub skip_start_event: bool,
    pub poll_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RunnerSettings {
    fn from(config: &Config) -> Self {
        Self {
            skip_start_event: config.skip_start_event,
            poll_interval: config.predict_poll_interval,
        }
    }
}

enum ActiveTask {
    Setup(TaskHandle<SetupResult>),
    Prediction {
        response: PredictionHandle,
        task: TaskHandle<PredictionResponse>,
    },
}

impl ActiveTask {
    fn is_finished(&self) -> bool {
        match self {
            ActiveTask::Setup(task) => task.is_finished(),
            ActiveTask::Prediction { task, .. } => task.is_finished(),
        }
    }

    fn activity(&self) -> &'static str {
        match self {
            ActiveTask::Setup(task) => task.activity(),
            ActiveTask::Prediction { task, .. } => task.activity(),
        }
    }

    fn abort(&self) {
        match self {
            ActiveTask::Setup(task) => task.abort(),
            ActiveTask::Prediction { task, .. } => task.abort(),
        }
    }
}

/// Single-slot scheduler for setup and predictions
pub struct PredictionRunner {
    worker: Arc<dyn Worker>,
    collaborators: Collaborators,
    settings: RunnerSettings,
    active: Option<ActiveTask>,
    should_cancel: CancelFlag,
    shutdown: CancellationToken,
    stopped: bool,
}

impl PredictionRunner {
    /// Creates a runner driving `worker`
    ///
    /// `shutdown` is cancelled when a background task fails in a way the
    /// runner can't recover from.
    pub fn new(
        worker: Arc<dyn Worker>,
        collaborators: Collaborators,
        settings: RunnerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            worker,
            collaborators,
            settings,
            active: None,
            should_cancel: CancelFlag::new(),
            shutdown,
            stopped: false,
        }
    }

    /// Starts the worker's one-time setup
    pub fn run_setup(&mut self) -> Result<TaskHandle<SetupResult>, RunnerError> {
        self.ensure_running()?;
        if self.is_busy() {
            return Err(RunnerError::Busy);
        }

        info!("Starting worker setup");
        let task = spawn_supervised(
            "setup",
            setup(Arc::clone(&self.worker), Arc::clone(&self.collaborators.probe))
                .instrument(info_span!("setup")),
            self.shutdown.clone(),
        );

        self.active = Some(ActiveTask::Setup(task.clone()));
        Ok(task)
    }

    /// Starts a prediction
    ///
    /// Resubmitting the prediction that is already running returns the
    /// existing handles instead of starting it again. With `upload`, output
    /// files are sent to the configured store.
    pub fn submit(
        &mut self,
        request: PredictionRequest,
        upload: bool,
    ) -> Result<(PredictionHandle, TaskHandle<PredictionResponse>), RunnerError> {
        self.ensure_running()?;
        if self.is_busy() {
            if let (Some(id), Some(ActiveTask::Prediction { response, task })) =
                (&request.id, &self.active)
            {
                if response.id().as_deref() == Some(id.as_str()) {
                    debug!("Prediction {} is already running", id);
                    return Ok((response.clone(), task.clone()));
                }
            }
            return Err(RunnerError::Busy);
        }

        // A request aimed at an earlier prediction must not leak into this one
        self.should_cancel.clear();

        let span = info_span!(
            "prediction",
            prediction_id = %request.id.as_deref().unwrap_or_default()
        );

        let response = PredictionHandle::new(PredictionResponse::from(&request));
        let notifier = Notifier::for_request(&request, Arc::clone(&self.collaborators.webhooks));
        let uploader = if upload {
            self.collaborators.uploader.clone()
        } else {
            None
        };
        let handler = span.in_scope(|| {
            PredictionEventHandler::new(
                response.clone(),
                notifier,
                uploader,
                self.settings.skip_start_event,
            )
        });

        let prediction = Prediction {
            worker: Arc::clone(&self.worker),
            request,
            handler,
            should_cancel: self.should_cancel.clone(),
            fetcher: Arc::clone(&self.collaborators.fetcher),
            poll_interval: self.settings.poll_interval,
        };
        let task = spawn_supervised(
            "prediction",
            predict(prediction).instrument(span),
            self.shutdown.clone(),
        );

        self.active = Some(ActiveTask::Prediction {
            response: response.clone(),
            task: task.clone(),
        });
        Ok((response, task))
    }

    fn ensure_running(&self) -> Result<(), RunnerError> {
        if self.stopped || self.shutdown.is_cancelled() {
            return Err(RunnerError::ShuttingDown);
        }
        Ok(())
    }

    /// Whether a setup or prediction is outstanding
    ///
    /// A finished task frees the slot the first time this is asked.
    pub fn is_busy(&mut self) -> bool {
        match &self.active {
            Some(active) if !active.is_finished() => true,
            Some(_) => {
                self.active = None;
                false
            }
            None => false,
        }
    }

    /// The prediction currently running, if any
    pub fn active_prediction(&mut self) -> Option<PredictionHandle> {
        if !self.is_busy() {
            return None;
        }
        match &self.active {
            Some(ActiveTask::Prediction { response, .. }) => Some(response.clone()),
            _ => None,
        }
    }

    /// Asks the running prediction to stop
    ///
    /// Does nothing when idle. With an id, fails unless it names the running
    /// prediction. The request is forwarded to the worker the next time the
    /// prediction's event stream advances.
    pub fn cancel(&mut self, prediction_id: Option<&str>) -> Result<(), RunnerError> {
        if !self.is_busy() {
            debug!("Nothing to cancel");
            return Ok(());
        }

        match (&self.active, prediction_id) {
            (Some(ActiveTask::Prediction { response, .. }), Some(id)) => {
                if response.id().as_deref() != Some(id) {
                    return Err(RunnerError::UnknownPrediction);
                }
            }
            (Some(ActiveTask::Setup(_)), Some(_)) => return Err(RunnerError::UnknownPrediction),
            (Some(ActiveTask::Setup(_)), None) => {
                debug!("Setup can't be canceled");
                return Ok(());
            }
            _ => {}
        }

        info!("Cancellation requested");
        self.should_cancel.request();
        Ok(())
    }

    /// Stops the active task and the worker
    ///
    /// The runner admits no work afterwards.
    pub fn shutdown(&mut self) {
        self.stopped = true;
        if let Some(active) = self.active.take() {
            warn!("Aborting outstanding {} task", active.activity());
            active.abort();
        }
        self.worker.terminate();
    }
}
