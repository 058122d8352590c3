//! In-process fakes for the runner's collaborators

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::stream;
use modelrun_client::{ClientError, FileUploader, RemoteFetcher, WebhookSender};
use modelrun_core::domain::prediction::WebhookEvent;
use modelrun_core::dto::worker::WorkerEvent;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempPath;

use crate::probes::ReadinessProbe;
use crate::worker::{EventStream, Worker, WorkerError};

#[derive(Debug, Clone)]
pub struct Sent {
    pub url: String,
    pub payload: JsonValue,
    pub event: WebhookEvent,
}

/// Webhook sender that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<WebhookEvent> {
        self.sent().into_iter().map(|s| s.event).collect()
    }

    pub fn payloads(&self, event: WebhookEvent) -> Vec<JsonValue> {
        self.sent()
            .into_iter()
            .filter(|s| s.event == event)
            .map(|s| s.payload)
            .collect()
    }
}

impl WebhookSender for RecordingSender {
    fn send(&self, url: &str, payload: JsonValue, event: WebhookEvent) {
        self.sent.lock().unwrap().push(Sent {
            url: url.to_string(),
            payload,
            event,
        });
    }
}

/// Uploader that maps `/any/dir/NAME` to `https://store.test/NAME`
#[derive(Debug, Default)]
pub struct FakeUploader {
    fail: bool,
    uploaded: Mutex<Vec<PathBuf>>,
}

impl FakeUploader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileUploader for FakeUploader {
    async fn upload(&self, path: &Path) -> modelrun_client::Result<String> {
        if self.fail {
            return Err(ClientError::api_error(503, "store unavailable"));
        }
        self.uploaded.lock().unwrap().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("https://store.test/{}", name))
    }
}

/// Fetcher that writes the URL itself into a temporary file
#[derive(Debug, Default)]
pub struct FakeFetcher {
    broken: HashSet<String>,
    fetched: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    /// Fails for `url`, succeeds for everything else
    pub fn failing_on(url: &str) -> Self {
        Self {
            broken: [url.to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn fetched(&self) -> Vec<PathBuf> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> modelrun_client::Result<TempPath> {
        if self.broken.contains(url) {
            return Err(ClientError::api_error(404, "not found"));
        }
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(url.as_bytes())?;
        let path = file.into_temp_path();
        self.fetched.lock().unwrap().push(path.to_path_buf());
        Ok(path)
    }
}

/// Probe counting how often readiness was signaled
#[derive(Debug, Default)]
pub struct RecordingProbe {
    signals: AtomicUsize,
}

impl RecordingProbe {
    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }
}

impl ReadinessProbe for RecordingProbe {
    fn ready(&self) {
        self.signals.fetch_add(1, Ordering::SeqCst);
    }
}

type Item = Result<WorkerEvent, WorkerError>;

enum Script {
    Events(Vec<Item>),
    Live(UnboundedReceiver<Item>),
}

impl Script {
    fn into_stream(self) -> EventStream {
        match self {
            Script::Events(items) => stream::iter(items).boxed(),
            Script::Live(rx) => rx.boxed(),
        }
    }
}

/// Worker replaying queued scripts, one per invocation
///
/// An invocation with nothing queued gets an empty stream.
#[derive(Default)]
pub struct ScriptedWorker {
    setups: Mutex<VecDeque<Script>>,
    predictions: Mutex<VecDeque<Script>>,
    inputs: Mutex<Vec<Map<String, JsonValue>>>,
    cancels: AtomicUsize,
    terminations: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_setup(&self, events: Vec<WorkerEvent>) {
        self.push_setup_results(events.into_iter().map(Ok).collect());
    }

    pub fn push_setup_results(&self, items: Vec<Item>) {
        self.setups.lock().unwrap().push_back(Script::Events(items));
    }

    pub fn push_predict(&self, events: Vec<WorkerEvent>) {
        self.push_predict_results(events.into_iter().map(Ok).collect());
    }

    pub fn push_predict_results(&self, items: Vec<Item>) {
        self.predictions
            .lock()
            .unwrap()
            .push_back(Script::Events(items));
    }

    /// Queues a prediction whose events are fed through the returned sender
    ///
    /// The stream stays open until the sender is dropped.
    pub fn push_live_predict(&self) -> UnboundedSender<Item> {
        let (tx, rx) = unbounded();
        self.predictions.lock().unwrap().push_back(Script::Live(rx));
        tx
    }

    pub fn inputs(&self) -> Vec<Map<String, JsonValue>> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn predict_calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn setup(&self) -> EventStream {
        match self.setups.lock().unwrap().pop_front() {
            Some(script) => script.into_stream(),
            None => stream::empty().boxed(),
        }
    }

    fn predict(&self, input: Map<String, JsonValue>, _poll_interval: Duration) -> EventStream {
        self.inputs.lock().unwrap().push(input);
        match self.predictions.lock().unwrap().pop_front() {
            Some(script) => script.into_stream(),
            None => stream::empty().boxed(),
        }
    }

    async fn cancel(&self) -> Result<(), WorkerError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}
