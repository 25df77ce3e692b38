use std::time::Duration;

use thiserror::Error;

/// Why a wait on the result store ended without a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("no result for {identifier} within {deadline:?}")]
    DeadlineExceeded {
        identifier: String,
        deadline: Duration,
    },

    #[error("wait for {0} was cancelled")]
    Cancelled(String),
}
