//! Tag-filtered fleet queries.

use std::sync::Arc;

use tracing::warn;

use fleetgate_core::{FleetSnapshot, FleetTag, InstanceState, WorkerInstance};

use crate::error::ProvisionResult;
use crate::provisioner::Provisioner;

const ACTIVE: [InstanceState; 2] = [InstanceState::Pending, InstanceState::Running];
const ALL_LIVE: [InstanceState; 3] = [
    InstanceState::Pending,
    InstanceState::Running,
    InstanceState::Stopped,
];

/// Read-through view of the instances carrying one fleet tag.
#[derive(Clone)]
pub struct FleetDirectory {
    provisioner: Arc<dyn Provisioner>,
    tag: FleetTag,
}

impl FleetDirectory {
    pub fn new(provisioner: Arc<dyn Provisioner>, tag: FleetTag) -> Self {
        Self { provisioner, tag }
    }

    pub fn tag(&self) -> &FleetTag {
        &self.tag
    }

    pub fn provisioner(&self) -> &Arc<dyn Provisioner> {
        &self.provisioner
    }

    /// Number of pending or running instances.
    ///
    /// A failed describe is logged and reported as zero. Scaling decisions
    /// use [`try_count_active`](Self::try_count_active) instead.
    pub async fn count_active(&self) -> u32 {
        match self.try_count_active().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, tag = %self.tag, "failed to count active instances");
                0
            }
        }
    }

    /// Like [`count_active`](Self::count_active) but surfaces the error.
    pub async fn try_count_active(&self) -> ProvisionResult<u32> {
        let active = self
            .provisioner
            .describe_instances(&self.tag, &ACTIVE)
            .await?;
        Ok(active.len() as u32)
    }

    /// Stopped instances, in provider order.
    pub async fn list_stopped(&self) -> ProvisionResult<Vec<WorkerInstance>> {
        self.provisioner
            .describe_instances(&self.tag, &[InstanceState::Stopped])
            .await
    }

    /// Running instances, in provider order.
    pub async fn list_running(&self) -> ProvisionResult<Vec<WorkerInstance>> {
        self.provisioner
            .describe_instances(&self.tag, &[InstanceState::Running])
            .await
    }

    /// Per-state counts from a single describe call.
    pub async fn snapshot(&self) -> ProvisionResult<FleetSnapshot> {
        let instances = self
            .provisioner
            .describe_instances(&self.tag, &ALL_LIVE)
            .await?;
        Ok(FleetSnapshot::from_instances(&instances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryProvisioner, ProvisionOp};

    fn tag() -> FleetTag {
        FleetTag::new("Name", "app-tier-instance")
    }

    async fn seeded() -> (MemoryProvisioner, FleetDirectory) {
        let p = MemoryProvisioner::manual();
        p.insert("i-run-1", InstanceState::Running, &tag()).await;
        p.insert("i-run-2", InstanceState::Running, &tag()).await;
        p.insert("i-pend", InstanceState::Pending, &tag()).await;
        p.insert("i-stop", InstanceState::Stopped, &tag()).await;
        p.insert("i-gone", InstanceState::Terminated, &tag()).await;
        p.insert("i-other", InstanceState::Running, &FleetTag::new("Name", "web"))
            .await;
        let dir = FleetDirectory::new(Arc::new(p.clone()), tag());
        (p, dir)
    }

    #[tokio::test]
    async fn counts_pending_and_running_with_tag() {
        let (_, dir) = seeded().await;
        assert_eq!(dir.count_active().await, 3);
    }

    #[tokio::test]
    async fn lists_by_state_in_order() {
        let (_, dir) = seeded().await;
        let running: Vec<_> = dir
            .list_running()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(running, vec!["i-run-1", "i-run-2"]);

        let stopped = dir.list_stopped().await.unwrap();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].id, "i-stop");
    }

    #[tokio::test]
    async fn snapshot_excludes_terminated() {
        let (_, dir) = seeded().await;
        let snap = dir.snapshot().await.unwrap();
        assert_eq!(snap.pending, 1);
        assert_eq!(snap.running, 2);
        assert_eq!(snap.stopped, 1);
        assert_eq!(snap.active(), 3);
    }

    #[tokio::test]
    async fn describe_failure_counts_as_zero() {
        let (p, dir) = seeded().await;
        p.inject_failures(ProvisionOp::Describe, 1);
        assert_eq!(dir.count_active().await, 0);
        assert_eq!(dir.count_active().await, 3);
    }

    #[tokio::test]
    async fn try_count_surfaces_failure() {
        let (p, dir) = seeded().await;
        p.inject_failures(ProvisionOp::Describe, 1);
        assert!(dir.try_count_active().await.is_err());
    }
}
