//! Supervised background tasks
//!
//! Setup and predictions run as tokio tasks. Each one is paired with a
//! watcher task that waits for it, logs how it ended, and publishes the
//! outcome to every [`TaskHandle`] clone. A task that returns an error or
//! panics is fatal for the whole process: the watcher cancels the shutdown
//! token so the driver can stop.

use std::future::Future;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// How a background task ended
#[derive(Debug, Clone)]
pub enum TaskOutcome<T> {
    Finished(T),
    /// The task returned an error or panicked
    Failed(String),
    Aborted,
}

impl<T> TaskOutcome<T> {
    pub fn finished(self) -> Option<T> {
        match self {
            TaskOutcome::Finished(value) => Some(value),
            _ => None,
        }
    }
}

/// Cloneable handle to a supervised task
#[derive(Debug, Clone)]
pub struct TaskHandle<T> {
    activity: &'static str,
    outcome: watch::Receiver<Option<TaskOutcome<T>>>,
    abort: AbortHandle,
}

impl<T: Clone> TaskHandle<T> {
    pub fn activity(&self) -> &'static str {
        self.activity
    }

    /// Whether the outcome has been published
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    pub fn outcome(&self) -> Option<TaskOutcome<T>> {
        self.outcome.borrow().clone()
    }

    /// Waits for the task to end
    pub async fn wait(&self) -> TaskOutcome<T> {
        let mut outcome = self.outcome.clone();
        match outcome.wait_for(Option::is_some).await {
            Ok(published) => published.clone().unwrap_or(TaskOutcome::Aborted),
            // Watcher gone without publishing; only happens when the runtime shuts down
            Err(_) => TaskOutcome::Aborted,
        }
    }

    /// Aborts the task at its next await point
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Whether both handles refer to the same task
    pub fn same_task(&self, other: &TaskHandle<T>) -> bool {
        self.outcome.same_channel(&other.outcome)
    }
}

/// Spawns `future` under supervision
pub fn spawn_supervised<T, F>(
    activity: &'static str,
    future: F,
    shutdown: CancellationToken,
) -> TaskHandle<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let (publish, outcome) = watch::channel(None);
    let task = tokio::spawn(future);
    let abort = task.abort_handle();

    tokio::spawn(async move {
        let result = match task.await {
            Ok(Ok(value)) => TaskOutcome::Finished(value),
            Ok(Err(e)) => {
                error!(error = ?e, "caught exception while running {}", activity);
                shutdown.cancel();
                TaskOutcome::Failed(format!("{:#}", e))
            }
            Err(e) if e.is_cancelled() => {
                debug!("{} task was aborted", activity);
                TaskOutcome::Aborted
            }
            Err(e) => {
                error!(error = %e, "caught exception while running {}", activity);
                shutdown.cancel();
                TaskOutcome::Failed(e.to_string())
            }
        };
        publish.send_replace(Some(result));
    });

    TaskHandle {
        activity,
        outcome,
        abort,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_finished_outcome_is_shared() {
        let shutdown = CancellationToken::new();
        let handle = spawn_supervised("setup", async { Ok(7) }, shutdown.clone());
        let other = handle.clone();

        assert_eq!(handle.wait().await.finished(), Some(7));
        assert!(other.is_finished());
        assert!(other.same_task(&handle));
        assert_eq!(other.outcome().and_then(TaskOutcome::finished), Some(7));
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_error_cancels_shutdown_token() {
        let shutdown = CancellationToken::new();
        let handle: TaskHandle<()> = spawn_supervised(
            "prediction",
            async { Err(anyhow::anyhow!("worker died")) },
            shutdown.clone(),
        );

        match handle.wait().await {
            TaskOutcome::Failed(message) => assert_eq!(message, "worker died"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_panic_cancels_shutdown_token() {
        let shutdown = CancellationToken::new();
        let handle: TaskHandle<()> = spawn_supervised(
            "prediction",
            async {
                if std::hint::black_box(true) {
                    panic!("bookkeeping broke");
                }
                Ok(())
            },
            shutdown.clone(),
        );

        assert!(matches!(handle.wait().await, TaskOutcome::Failed(_)));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_abort_is_not_fatal() {
        let shutdown = CancellationToken::new();
        let handle: TaskHandle<()> = spawn_supervised(
            "prediction",
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            },
            shutdown.clone(),
        );

        assert!(!handle.is_finished());
        handle.abort();

        assert!(matches!(handle.wait().await, TaskOutcome::Aborted));
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_distinct_tasks() {
        let shutdown = CancellationToken::new();
        let a = spawn_supervised("setup", async { Ok(1) }, shutdown.clone());
        let b = spawn_supervised("setup", async { Ok(2) }, shutdown);
        assert!(!a.same_task(&b));
    }
}
