//! Subprocess worker
//!
//! Runs the worker as a child process and speaks the JSON-lines protocol
//! from `modelrun_core::dto::worker` over its stdin/stdout. The child's
//! stderr is inherited so its own diagnostics end up next to ours.
//!
//! One command is in flight at a time; the runner guarantees that by only
//! ever driving a single setup or prediction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use modelrun_core::dto::worker::{WorkerCommand, WorkerEvent};
use serde_json::{Map, Value as JsonValue};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::{EventStream, Worker, WorkerError};

type StdoutLines = Lines<BufReader<ChildStdout>>;

/// Worker backed by a child process
pub struct ProcessWorker {
    child: Mutex<Child>,
    stdin: Arc<AsyncMutex<ChildStdin>>,
    stdout: Arc<AsyncMutex<StdoutLines>>,
    terminated: Arc<AtomicBool>,
}

impl ProcessWorker {
    /// Starts the worker from a whitespace-separated command line
    pub fn spawn(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().context("Worker command is empty")?;
        let args: Vec<&str> = parts.collect();
        Self::spawn_command(program, &args)
    }

    /// Starts the worker from a program and its arguments
    pub fn spawn_command(program: &str, args: &[&str]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start worker process '{}'", program))?;

        let stdin = child
            .stdin
            .take()
            .context("Worker stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("Worker stdout was not captured")?;

        info!("Worker process '{}' started (pid {:?})", program, child.id());

        Ok(Self {
            child: Mutex::new(child),
            stdin: Arc::new(AsyncMutex::new(stdin)),
            stdout: Arc::new(AsyncMutex::new(BufReader::new(stdout).lines())),
            terminated: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Sends a command and streams the events answering it
    fn invoke(&self, command: WorkerCommand) -> EventStream {
        let invocation = Invocation {
            command: Some(command),
            stdin: Arc::clone(&self.stdin),
            stdout: Arc::clone(&self.stdout),
            terminated: Arc::clone(&self.terminated),
            finished: false,
        };

        stream::unfold(invocation, next_event).boxed()
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn setup(&self) -> EventStream {
        self.invoke(WorkerCommand::Setup)
    }

    fn predict(&self, input: Map<String, JsonValue>, poll_interval: Duration) -> EventStream {
        self.invoke(WorkerCommand::Predict {
            input,
            poll_interval: poll_interval.as_secs_f64(),
        })
    }

    async fn cancel(&self) -> Result<(), WorkerError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(WorkerError::NotRunning);
        }
        debug!("Sending cancel to worker");
        write_command(&self.stdin, &WorkerCommand::Cancel).await
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);

        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match child.start_kill() {
            Ok(()) => info!("Worker process terminated"),
            Err(e) => warn!("Failed to terminate worker process: {}", e),
        }
    }
}

/// State of one command's event stream
struct Invocation {
    command: Option<WorkerCommand>,
    stdin: Arc<AsyncMutex<ChildStdin>>,
    stdout: Arc<AsyncMutex<StdoutLines>>,
    terminated: Arc<AtomicBool>,
    finished: bool,
}

async fn next_event(
    mut inv: Invocation,
) -> Option<(Result<WorkerEvent, WorkerError>, Invocation)> {
    if inv.finished {
        return None;
    }

    if inv.terminated.load(Ordering::SeqCst) {
        inv.finished = true;
        return Some((Err(WorkerError::NotRunning), inv));
    }

    if let Some(command) = inv.command.take() {
        if let Err(e) = write_command(&inv.stdin, &command).await {
            inv.finished = true;
            return Some((Err(e), inv));
        }
    }

    let line = {
        let mut lines = inv.stdout.lock().await;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                other => break other,
            }
        }
    };

    match line {
        Ok(Some(line)) => {
            let event = decode_line(&line);
            // Anything after `done` answers the next command
            inv.finished = matches!(event, Ok(WorkerEvent::Done(_)) | Err(_));
            Some((event, inv))
        }
        Ok(None) => {
            warn!("Worker closed its stdout before finishing");
            inv.finished = true;
            Some((Err(WorkerError::Exited), inv))
        }
        Err(e) => {
            inv.finished = true;
            Some((Err(e.into()), inv))
        }
    }
}

async fn write_command(
    stdin: &AsyncMutex<ChildStdin>,
    command: &WorkerCommand,
) -> Result<(), WorkerError> {
    let mut line = serde_json::to_string(command).map_err(|source| WorkerError::Protocol {
        line: format!("{:?}", command),
        source,
    })?;
    line.push('\n');

    let mut stdin = stdin.lock().await;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Decodes one line of worker output
pub(crate) fn decode_line(line: &str) -> Result<WorkerEvent, WorkerError> {
    serde_json::from_str(line).map_err(|source| WorkerError::Protocol {
        line: line.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrun_core::dto::worker::Done;

    #[test]
    fn test_decode_line() {
        let event = decode_line(r#"{"type":"output_type","multi":false}"#).unwrap();
        assert_eq!(event, WorkerEvent::OutputType { multi: false });
    }

    #[test]
    fn test_decode_line_rejects_garbage() {
        let err = decode_line("Traceback (most recent call last):").unwrap_err();
        match err {
            WorkerError::Protocol { line, .. } => {
                assert_eq!(line, "Traceback (most recent call last):")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_spawn_rejects_empty_command() {
        assert!(ProcessWorker::spawn("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_setup_stream_ends_at_done() {
        let worker = ProcessWorker::spawn_command(
            "sh",
            &[
                "-c",
                r#"read cmd; echo '{"type":"log","message":"loading"}'; echo; echo '{"type":"done"}'; sleep 5"#,
            ],
        )
        .unwrap();

        let events: Vec<_> = worker.setup().collect().await;
        let events: Vec<WorkerEvent> = events.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            events,
            vec![WorkerEvent::log("loading"), WorkerEvent::Done(Done::success())]
        );

        worker.terminate();
        assert!(matches!(worker.cancel().await, Err(WorkerError::NotRunning)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_before_done_is_an_error() {
        let worker = ProcessWorker::spawn_command(
            "sh",
            &["-c", r#"read cmd; echo '{"type":"output_type","multi":false}'; exit 1"#],
        )
        .unwrap();

        let events: Vec<_> = worker
            .predict(Map::new(), Duration::from_millis(100))
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &WorkerEvent::OutputType { multi: false }
        );
        assert!(matches!(events[1], Err(WorkerError::Exited)));
    }
}
