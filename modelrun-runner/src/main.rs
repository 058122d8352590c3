//! Modelrun Runner
//!
//! Starts the worker process, runs its setup, then serves predictions read
//! as JSON lines from stdin. Each final prediction response is written as a
//! JSON line to stdout; logs go to stderr.
//!
//! The process exits when stdin closes, on Ctrl-C, or when the runner hits
//! a fatal error (in which case the exit status is non-zero).

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelrun_core::domain::prediction::PredictionRequest;
use modelrun_runner::{
    Collaborators, Config, PredictionRunner, ProcessWorker, RunnerSettings, TaskOutcome,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout carries responses
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelrun_runner=info,modelrun_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting modelrun runner");

    let config = load_config()?;
    info!(
        "Loaded configuration: worker_command={}, upload_url={:?}",
        config.worker_command, config.upload_url
    );

    let worker = Arc::new(ProcessWorker::spawn(&config.worker_command)?);
    let collaborators =
        Collaborators::from_config(&config).context("Failed to initialize HTTP clients")?;
    let shutdown = CancellationToken::new();
    let mut runner = PredictionRunner::new(
        worker,
        collaborators,
        RunnerSettings::from(&config),
        shutdown.clone(),
    );

    if !run_setup(&mut runner, &shutdown).await? {
        runner.shutdown();
        anyhow::bail!("Worker setup failed");
    }

    let result = serve(&mut runner, &shutdown).await;
    runner.shutdown();

    if shutdown.is_cancelled() {
        error!("Runner stopped after a fatal error");
        anyhow::bail!("Runner stopped after a fatal error");
    }
    result
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            warn!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Runs setup; false when it failed or was interrupted
async fn run_setup(runner: &mut PredictionRunner, shutdown: &CancellationToken) -> Result<bool> {
    let task = runner.run_setup()?;

    let outcome = tokio::select! {
        outcome = task.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted during setup");
            return Ok(false);
        }
        _ = shutdown.cancelled() => return Ok(false),
    };

    match outcome {
        TaskOutcome::Finished(result) if result.succeeded() => {
            info!("Setup finished in {}", result.completed_at - result.started_at);
            Ok(true)
        }
        TaskOutcome::Finished(result) => {
            error!("Setup failed. Worker logs:\n{}", result.logs);
            Ok(false)
        }
        TaskOutcome::Failed(e) => {
            error!("Setup crashed: {}", e);
            Ok(false)
        }
        TaskOutcome::Aborted => Ok(false),
    }
}

/// Serves prediction requests from stdin until it closes
async fn serve(runner: &mut PredictionRunner, shutdown: &CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("Ready for predictions");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read request")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
            _ = shutdown.cancelled() => return Ok(()),
        };

        let Some(line) = line else {
            info!("Input closed, shutting down");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut request: PredictionRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Ignoring malformed prediction request: {}", e);
                continue;
            }
        };
        if request.id.is_none() {
            request.id = Some(uuid::Uuid::new_v4().to_string());
        }

        let (response, task) = runner.submit(request, true)?;

        tokio::select! {
            _ = task.wait() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, canceling prediction");
                runner.cancel(None)?;
                task.wait().await;
            }
        }

        let mut out = serde_json::to_string(&response.snapshot())?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
}
