//! Runner configuration
//!
//! Defines all configurable parameters for the runner: how to start the
//! worker, where output files go, and the timing knobs for heartbeats and
//! webhook delivery.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
///
/// Intervals are configurable so the same binary can be tuned for local
/// development and for production deployments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Command line that starts the worker process
    pub worker_command: String,

    /// Pre-signed endpoint output files are uploaded to; uploads are off
    /// when unset
    pub upload_url: Option<String>,

    /// Don't send the `start` webhook
    pub skip_start_event: bool,

    /// How often the worker must report progress while predicting
    pub predict_poll_interval: Duration,

    /// Minimum spacing between non-terminal webhooks to the same URL
    pub throttle_response_interval: Duration,

    /// Timeout for each webhook request
    pub webhook_timeout: Duration,

    /// File created once setup succeeds
    pub ready_file: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(worker_command: String) -> Self {
        Self {
            worker_command,
            upload_url: None,
            skip_start_event: false,
            predict_poll_interval: Duration::from_millis(100),
            throttle_response_interval: Duration::from_millis(500),
            webhook_timeout: Duration::from_secs(10),
            ready_file: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - MODELRUN_WORKER_COMMAND (optional, default: "python -m worker")
    /// - MODELRUN_UPLOAD_URL (optional)
    /// - MODELRUN_SKIP_START_EVENT (optional, "1"/"true" to enable)
    /// - MODELRUN_PREDICT_POLL_INTERVAL_MS (optional, default: 100)
    /// - MODELRUN_THROTTLE_RESPONSE_INTERVAL_MS (optional, default: 500)
    /// - MODELRUN_WEBHOOK_TIMEOUT_SECS (optional, default: 10)
    /// - MODELRUN_READY_FILE (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let worker_command = lookup("MODELRUN_WORKER_COMMAND")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.worker_command);

        let upload_url = lookup("MODELRUN_UPLOAD_URL").filter(|s| !s.is_empty());

        let skip_start_event = match lookup("MODELRUN_SKIP_START_EVENT") {
            Some(value) => parse_flag(&value).ok_or_else(|| {
                anyhow::anyhow!("MODELRUN_SKIP_START_EVENT must be a boolean, got '{}'", value)
            })?,
            None => defaults.skip_start_event,
        };

        let predict_poll_interval = lookup("MODELRUN_PREDICT_POLL_INTERVAL_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.predict_poll_interval);

        let throttle_response_interval = lookup("MODELRUN_THROTTLE_RESPONSE_INTERVAL_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.throttle_response_interval);

        let webhook_timeout = lookup("MODELRUN_WEBHOOK_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.webhook_timeout);

        let ready_file = lookup("MODELRUN_READY_FILE")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            worker_command,
            upload_url,
            skip_start_event,
            predict_poll_interval,
            throttle_response_interval,
            webhook_timeout,
            ready_file,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_command.trim().is_empty() {
            anyhow::bail!("worker_command cannot be empty");
        }

        if let Some(url) = &self.upload_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("upload_url must start with http:// or https://");
            }
        }

        if self.predict_poll_interval.is_zero() {
            anyhow::bail!("predict_poll_interval must be greater than 0");
        }

        if self.webhook_timeout.is_zero() {
            anyhow::bail!("webhook_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("python -m worker".to_string())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
