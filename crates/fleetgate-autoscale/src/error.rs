//! Scaling tick errors.

use thiserror::Error;

use fleetgate_fleet::ProvisionError;
use fleetgate_queue::QueueError;

/// Result type alias for scaling ticks.
pub type ScaleResult<T> = Result<T, ScaleError>;

/// Why a scaling tick was abandoned.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("queue depth unavailable: {0}")]
    Queue(#[from] QueueError),

    #[error("provisioning call failed: {0}")]
    Provision(#[from] ProvisionError),
}
