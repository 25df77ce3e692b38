//! Submission errors.

use std::time::Duration;

use thiserror::Error;

use fleetgate_queue::QueueError;
use fleetgate_results::WaitError;

/// Result type alias for gateway submissions.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("cannot derive an identifier from {0:?}")]
    InvalidIdentifier(String),

    #[error("request {0} is already in flight")]
    InFlight(String),

    #[error("failed to encode request message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish request: {0}")]
    Publish(#[from] QueueError),

    #[error("no result for {identifier} within {deadline:?}")]
    DeadlineExceeded {
        identifier: String,
        deadline: Duration,
    },

    #[error("request {0} cancelled by shutdown")]
    Cancelled(String),
}

impl From<WaitError> for GatewayError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::DeadlineExceeded {
                identifier,
                deadline,
            } => GatewayError::DeadlineExceeded {
                identifier,
                deadline,
            },
            WaitError::Cancelled(identifier) => GatewayError::Cancelled(identifier),
        }
    }
}
