//! Provisioning API errors.

use thiserror::Error;

use fleetgate_core::InstanceState;

/// Result type alias for provisioning calls.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("describe instances failed: {0}")]
    Describe(String),

    #[error("start instances failed: {0}")]
    Start(String),

    #[error("stop instances failed: {0}")]
    Stop(String),

    #[error("create instance failed: {0}")]
    Create(String),

    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("cannot {action} instance {id} while {from}")]
    InvalidTransition {
        id: String,
        from: InstanceState,
        action: &'static str,
    },
}
