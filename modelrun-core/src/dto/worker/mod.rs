//! Worker protocol DTOs
//!
//! The worker process is driven with newline-delimited JSON. Every message
//! is an object whose `type` field selects the variant:
//!
//! ```text
//! runner -> worker   {"type":"predict","input":{"text":"hi"},"poll_interval":0.1}
//! worker -> runner   {"type":"output_type","multi":false}
//! worker -> runner   {"type":"output","payload":"HI"}
//! worker -> runner   {"type":"done","canceled":false,"error":false}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Commands sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Load the model; answered with `log` events and one `done`
    Setup,

    /// Run one prediction; answered with a stream ending in `done`
    Predict {
        input: Map<String, JsonValue>,
        /// Seconds between heartbeats
        poll_interval: f64,
    },

    /// Interrupt the prediction currently running, if any
    Cancel,
}

/// Terminal event of a setup or predict invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Done {
    #[serde(default)]
    pub canceled: bool,

    #[serde(default)]
    pub error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Done {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn canceled() -> Self {
        Self {
            canceled: true,
            ..Self::default()
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            error: true,
            error_detail: Some(detail.into()),
            ..Self::default()
        }
    }
}

/// Events emitted by the worker
///
/// Any `type` this version doesn't know decodes to [`WorkerEvent::Unknown`]
/// so newer workers keep working against older runners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// Text written by the model code
    Log { message: String },

    /// Liveness tick; carries nothing
    Heartbeat,

    /// Declares whether outputs are a single value or a sequence
    OutputType { multi: bool },

    /// One output value (or one element of a sequence)
    Output { payload: JsonValue },

    Done(Done),

    #[serde(other)]
    Unknown,
}

impl WorkerEvent {
    pub fn log(message: impl Into<String>) -> Self {
        WorkerEvent::Log {
            message: message.into(),
        }
    }

    pub fn output(payload: impl Into<JsonValue>) -> Self {
        WorkerEvent::Output {
            payload: payload.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, WorkerEvent::Done(_))
    }
}
