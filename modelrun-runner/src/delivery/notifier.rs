//! Filtered webhook notifications
//!
//! A [`Notifier`] is built per prediction from its request: it knows the
//! target URL (if any) and which event tags the caller asked for, and hands
//! snapshots that pass the filter to the shared [`WebhookSender`].

use modelrun_client::WebhookSender;
use modelrun_core::domain::prediction::{PredictionRequest, PredictionResponse, WebhookEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

struct Target {
    url: String,
    filter: HashSet<WebhookEvent>,
    sender: Arc<dyn WebhookSender>,
}

/// Per-prediction webhook notifier
pub struct Notifier {
    target: Option<Target>,
}

impl Notifier {
    /// Notifier that never sends anything
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn new(
        url: impl Into<String>,
        filter: HashSet<WebhookEvent>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            target: Some(Target {
                url: url.into(),
                filter,
                sender,
            }),
        }
    }

    /// Builds the notifier a request asks for
    pub fn for_request(request: &PredictionRequest, sender: Arc<dyn WebhookSender>) -> Self {
        match &request.webhook {
            Some(url) => Self::new(url.clone(), request.events_filter(), sender),
            None => Self::disabled(),
        }
    }

    /// Sends a snapshot of `response` if `event` passes the filter
    pub fn notify(&self, response: &PredictionResponse, event: WebhookEvent) {
        let Some(target) = &self.target else {
            return;
        };

        if !target.filter.contains(&event) {
            debug!("Skipping {} webhook, not in filter", event);
            return;
        }

        match serde_json::to_value(response) {
            Ok(payload) => target.sender.send(&target.url, payload, event),
            Err(e) => warn!("Failed to serialize {} webhook payload: {}", event, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSender;
    use modelrun_core::domain::prediction::Status;

    fn response() -> PredictionResponse {
        PredictionResponse {
            id: Some("p1".to_string()),
            status: Some(Status::Processing),
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_sends_nothing() {
        let notifier = Notifier::disabled();
        assert!(notifier.target.is_none());
        notifier.notify(&response(), WebhookEvent::Start);
    }

    #[test]
    fn test_filter_drops_unrequested_events() {
        let sender = Arc::new(RecordingSender::default());
        let filter = [WebhookEvent::Start, WebhookEvent::Completed]
            .into_iter()
            .collect();
        let notifier = Notifier::new("http://hook.test", filter, sender.clone());

        notifier.notify(&response(), WebhookEvent::Start);
        notifier.notify(&response(), WebhookEvent::Logs);
        notifier.notify(&response(), WebhookEvent::Logs);
        notifier.notify(&response(), WebhookEvent::Output);
        notifier.notify(&response(), WebhookEvent::Completed);

        assert_eq!(
            sender.events(),
            vec![WebhookEvent::Start, WebhookEvent::Completed]
        );
    }

    #[test]
    fn test_payload_is_serialized_snapshot() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = Notifier::new(
            "http://hook.test",
            WebhookEvent::default_events(),
            sender.clone(),
        );

        notifier.notify(&response(), WebhookEvent::Start);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://hook.test");
        assert_eq!(
            sent[0].payload,
            serde_json::json!({"id": "p1", "input": {}, "status": "processing"})
        );
    }

    #[test]
    fn test_for_request_uses_default_filter() {
        let sender = Arc::new(RecordingSender::default());
        let request = PredictionRequest {
            webhook: Some("http://hook.test".to_string()),
            ..Default::default()
        };

        let notifier = Notifier::for_request(&request, sender.clone());
        for event in [
            WebhookEvent::Start,
            WebhookEvent::Output,
            WebhookEvent::Logs,
            WebhookEvent::Completed,
        ] {
            notifier.notify(&response(), event);
        }
        assert_eq!(sender.events().len(), 4);

        let notifier = Notifier::for_request(&PredictionRequest::default(), sender);
        assert!(notifier.target.is_none());
    }
}
