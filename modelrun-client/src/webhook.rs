//! Webhook delivery
//!
//! [`WebhookClient`] queues prediction snapshots and POSTs them from a single
//! background task, so deliveries leave in the order they were queued and
//! the caller never waits on the network. Non-terminal deliveries to the
//! same URL are throttled; the terminal `completed` delivery is always sent
//! and retried with backoff.

use modelrun_core::domain::prediction::WebhookEvent;
use reqwest::{Client, Method};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::retry::RetryPolicy;

/// Sends a prediction snapshot to a webhook URL
///
/// Implementations must not block and must not fail the caller; delivery
/// problems are theirs to log.
pub trait WebhookSender: Send + Sync {
    fn send(&self, url: &str, payload: JsonValue, event: WebhookEvent);
}

/// Webhook client configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Timeout for a single POST
    pub request_timeout: Duration,
    /// Minimum gap between two non-terminal deliveries to one URL
    pub throttle_interval: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            throttle_interval: Duration::from_millis(500),
        }
    }
}

/// Per-URL rate limiter for non-terminal deliveries
#[derive(Debug)]
pub struct ResponseThrottle {
    interval: Duration,
    last_sent: HashMap<String, Instant>,
}

impl ResponseThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    /// Decides whether a delivery goes out now and records it if so
    ///
    /// Terminal deliveries always go out and reset the URL's history.
    pub fn should_send(&mut self, url: &str, terminal: bool, now: Instant) -> bool {
        if terminal {
            self.last_sent.remove(url);
            return true;
        }

        match self.last_sent.get(url) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                self.last_sent.insert(url.to_string(), now);
                true
            }
        }
    }
}

struct Delivery {
    url: String,
    payload: JsonValue,
    event: WebhookEvent,
}

/// Ordered, non-blocking webhook delivery
///
/// Must be created inside a Tokio runtime; the delivery task lives as long
/// as the client.
pub struct WebhookClient {
    tx: mpsc::UnboundedSender<Delivery>,
    throttle: Mutex<ResponseThrottle>,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(delivery_loop(client, rx));

        Ok(Self {
            tx,
            throttle: Mutex::new(ResponseThrottle::new(config.throttle_interval)),
        })
    }
}

impl WebhookSender for WebhookClient {
    fn send(&self, url: &str, payload: JsonValue, event: WebhookEvent) {
        let terminal = event == WebhookEvent::Completed;
        let allowed = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_send(url, terminal, Instant::now());

        if !allowed {
            debug!("Throttled {} webhook to {}", event, url);
            return;
        }

        let delivery = Delivery {
            url: url.to_string(),
            payload,
            event,
        };
        if self.tx.send(delivery).is_err() {
            warn!("Webhook delivery task has stopped, dropping {} webhook", event);
        }
    }
}

async fn delivery_loop(client: Client, mut rx: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(delivery) = rx.recv().await {
        let policy = if delivery.event == WebhookEvent::Completed {
            RetryPolicy::terminal_webhook()
        } else {
            RetryPolicy::none()
        };

        let result = policy
            .send(Method::POST, || {
                client.post(&delivery.url).json(&delivery.payload)
            })
            .await;

        match result {
            Ok(_) => debug!("Delivered {} webhook to {}", delivery.event, delivery.url),
            Err(e) => warn!(
                url = %delivery.url,
                event = %delivery.event,
                error = %e,
                "Webhook delivery failed"
            ),
        }
    }

    debug!("Webhook delivery task finished");
}
