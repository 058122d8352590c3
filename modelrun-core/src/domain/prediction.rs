//! Prediction domain types
//!
//! A prediction is one invocation of the model behind the worker. The
//! request is immutable once submitted; the response is built up by the
//! runner while the worker streams events and is shared with whoever
//! submitted the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};

/// Prediction lifecycle status
///
/// Once a prediction reaches a terminal status it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Starting,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

impl Status {
    /// Whether this status is final
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Succeeded | Status::Canceled | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Starting => "starting",
            Status::Processing => "processing",
            Status::Succeeded => "succeeded",
            Status::Canceled => "canceled",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Webhook notification tags a caller can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookEvent {
    Start,
    Output,
    Logs,
    Completed,
}

impl WebhookEvent {
    /// The filter applied when a request doesn't specify one
    pub fn default_events() -> HashSet<WebhookEvent> {
        [
            WebhookEvent::Start,
            WebhookEvent::Output,
            WebhookEvent::Logs,
            WebhookEvent::Completed,
        ]
        .into_iter()
        .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WebhookEvent::Start => "start",
            WebhookEvent::Output => "output",
            WebhookEvent::Logs => "logs",
            WebhookEvent::Completed => "completed",
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to input content that must be downloaded before the worker runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RemoteInput {
    url: String,
}

impl RemoteInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// A single named input value
///
/// Plain JSON is passed to the worker as-is. Remote inputs are marked by
/// the front end (which knows the model's input schema) and are fetched
/// into local files first. Over the wire both serialize as plain JSON, so
/// anything deserialized is always [`InputValue::Value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputValue {
    Value(JsonValue),
    Remote(RemoteInput),
}

impl InputValue {
    pub fn remote(url: impl Into<String>) -> Self {
        InputValue::Remote(RemoteInput::new(url))
    }
}

impl<'de> Deserialize<'de> for InputValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        JsonValue::deserialize(deserializer).map(InputValue::Value)
    }
}

impl From<JsonValue> for InputValue {
    fn from(value: JsonValue) -> Self {
        InputValue::Value(value)
    }
}

/// Named inputs of a prediction
pub type PredictionInput = BTreeMap<String, InputValue>;

/// Request to run a prediction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Caller-assigned identity, unique among concurrently active predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub input: PredictionInput,

    /// URL notified as the prediction progresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,

    /// Which notifications to send; all of them when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_events_filter: Option<Vec<WebhookEvent>>,
}

impl PredictionRequest {
    /// The effective notification filter for this request
    pub fn events_filter(&self) -> HashSet<WebhookEvent> {
        match &self.webhook_events_filter {
            Some(events) if !events.is_empty() => events.iter().copied().collect(),
            _ => WebhookEvent::default_events(),
        }
    }
}

/// Metrics computed once a prediction succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Seconds between start and completion
    pub predict_time: f64,
}

/// Prediction state as reported to callers and webhooks
///
/// Fields that were never set are left out of the serialized form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub input: PredictionInput,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_events_filter: Option<Vec<WebhookEvent>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl From<&PredictionRequest> for PredictionResponse {
    fn from(request: &PredictionRequest) -> Self {
        Self {
            id: request.id.clone(),
            created_at: request.created_at,
            input: request.input.clone(),
            webhook: request.webhook.clone(),
            webhook_events_filter: request.webhook_events_filter.clone(),
            ..Default::default()
        }
    }
}

impl PredictionResponse {
    /// Whether the prediction has reached a final status
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(Status::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_statuses() {
        assert!(!Status::Starting.is_terminal());
        assert!(!Status::Processing.is_terminal());
        assert!(Status::Succeeded.is_terminal());
        assert!(Status::Canceled.is_terminal());
        assert!(Status::Failed.is_terminal());
    }

    #[test]
    fn test_default_events_filter_has_all_tags() {
        let request = PredictionRequest::default();
        let filter = request.events_filter();
        assert_eq!(filter.len(), 4);
        assert!(filter.contains(&WebhookEvent::Logs));
    }

    #[test]
    fn test_explicit_events_filter() {
        let request: PredictionRequest = serde_json::from_value(json!({
            "id": "p1",
            "input": {"text": "hi"},
            "webhook": "http://example.com/hook",
            "webhook_events_filter": ["start", "completed"]
        }))
        .unwrap();

        let filter = request.events_filter();
        assert_eq!(filter.len(), 2);
        assert!(filter.contains(&WebhookEvent::Start));
        assert!(!filter.contains(&WebhookEvent::Output));
    }

    #[test]
    fn test_remote_input_serializes_as_url() {
        let mut input = PredictionInput::new();
        input.insert("image".to_string(), InputValue::remote("https://x.test/a.png"));
        input.insert("steps".to_string(), json!(20).into());

        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value, json!({"image": "https://x.test/a.png", "steps": 20}));

        // The marker doesn't survive a round trip; only the front end sets it
        let back: PredictionInput = serde_json::from_value(value).unwrap();
        assert_eq!(back["image"], InputValue::Value(json!("https://x.test/a.png")));
    }

    #[test]
    fn test_response_copies_request_and_skips_unset_fields() {
        let request = PredictionRequest {
            id: Some("abc".to_string()),
            webhook: Some("http://example.com".to_string()),
            ..Default::default()
        };

        let response = PredictionResponse::from(&request);
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(
            value,
            json!({"id": "abc", "input": {}, "webhook": "http://example.com"})
        );
        assert!(!response.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Status::Succeeded).unwrap(),
            json!("succeeded")
        );
        assert_eq!(WebhookEvent::Completed.to_string(), "completed");
    }
}
