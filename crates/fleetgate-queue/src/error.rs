//! Queue transport errors.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by a [`crate::MessageQueue`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("queue attributes unavailable: {0}")]
    Attributes(String),

    #[error("unknown receipt handle: {0}")]
    UnknownReceipt(String),
}
