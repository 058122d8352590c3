//! Runner error types

use modelrun_client::ClientError;
use thiserror::Error;

/// Errors returned by the runner's admission and cancellation calls
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    /// A setup or a different prediction is already running
    #[error("runner is busy")]
    Busy,

    /// Cancellation named a prediction that isn't the active one
    #[error("unknown prediction id")]
    UnknownPrediction,

    /// The runner was shut down or hit a fatal error
    #[error("runner is shutting down")]
    ShuttingDown,
}

/// Output files could not be uploaded
///
/// Irrecoverable for the prediction that produced them, but not for the
/// runner.
#[derive(Debug, Error)]
#[error("Got error trying to upload output files")]
pub struct FileUploadError {
    #[source]
    pub source: ClientError,
}

impl From<ClientError> for FileUploadError {
    fn from(source: ClientError) -> Self {
        Self { source }
    }
}
