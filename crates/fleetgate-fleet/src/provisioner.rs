//! The compute-provisioning seam.

use async_trait::async_trait;

use fleetgate_core::{FleetTag, InstanceId, InstanceState, LaunchTemplate, WorkerInstance};

use crate::error::ProvisionResult;

/// A compute-provisioning API.
///
/// Deactivation is always a stop, so there is no terminate operation.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Instances carrying `tag` whose state is one of `states`.
    async fn describe_instances(
        &self,
        tag: &FleetTag,
        states: &[InstanceState],
    ) -> ProvisionResult<Vec<WorkerInstance>>;

    /// Start stopped instances. Each moves to pending.
    async fn start_instances(&self, ids: &[InstanceId]) -> ProvisionResult<()>;

    /// Stop running instances. They keep their identity and can be started again.
    async fn stop_instances(&self, ids: &[InstanceId]) -> ProvisionResult<()>;

    /// Launch exactly one fresh instance from `template`. It starts pending.
    async fn create_instance(&self, template: &LaunchTemplate) -> ProvisionResult<InstanceId>;
}
