//! Domain types for the worker fleet and its scaling policy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Provider-assigned identifier of a worker instance.
pub type InstanceId = String;

// ── Instances ──────────────────────────────────────────────────────

/// Lifecycle state of a worker instance, as reported by the provisioning API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Launched or started, not yet serving.
    Pending,
    Running,
    /// Deactivated but reusable.
    Stopped,
    Terminated,
}

impl InstanceState {
    /// Pending and running instances both count against the fleet ceiling.
    pub fn is_active(self) -> bool {
        matches!(self, InstanceState::Pending | InstanceState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopped => "stopped",
            InstanceState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tag that marks an instance as a member of this fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FleetTag {
    pub key: String,
    pub value: String,
}

impl FleetTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for FleetTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// A worker instance as seen through the provisioning API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInstance {
    pub id: InstanceId,
    pub state: InstanceState,
    pub tag: FleetTag,
}

/// Parameters for creating a fresh worker instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplate {
    /// Machine image the worker boots from.
    pub image_id: String,
    /// Instance size, e.g. `t2.micro`.
    pub instance_type: String,
    pub tag: FleetTag,
}

/// Point-in-time census of the fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub pending: u32,
    pub running: u32,
    pub stopped: u32,
}

impl FleetSnapshot {
    /// Build a snapshot by counting instance states.
    pub fn from_instances<'a>(instances: impl IntoIterator<Item = &'a WorkerInstance>) -> Self {
        let mut snap = FleetSnapshot::default();
        for inst in instances {
            match inst.state {
                InstanceState::Pending => snap.pending += 1,
                InstanceState::Running => snap.running += 1,
                InstanceState::Stopped => snap.stopped += 1,
                InstanceState::Terminated => {}
            }
        }
        snap
    }

    /// Instances in {running, pending}.
    pub fn active(&self) -> u32 {
        self.pending + self.running
    }
}

// ── Scaling policy ─────────────────────────────────────────────────

/// How many instances a scale-up asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleUpMode {
    /// `min(pending, ceiling - active)`.
    #[default]
    CapacityAware,
    /// `min(batch_size, ceiling - active)` regardless of queue depth.
    FixedBatch,
}

/// When the fleet counts as over-provisioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDownMode {
    /// `pending == 0 && active > 0`.
    #[default]
    QueueEmpty,
    /// `pending < active`.
    PendingBelowActive,
}

/// Thresholds and cadence for the fleet scaler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScalingPolicy {
    /// Hard upper bound on active (pending + running) instances.
    pub ceiling: u32,
    /// Most instances started or stopped by one scaling action.
    pub batch_size: u32,
    /// Interval between scaling ticks.
    #[serde(with = "crate::duration")]
    pub tick: Duration,
    /// How long an over-provisioned fleet must stay that way before
    /// instances are stopped.
    #[serde(with = "crate::duration")]
    pub idle_delay: Duration,
    pub scale_up: ScaleUpMode,
    pub scale_down: ScaleDownMode,
    /// Fresh instances created per tick when nothing can be reactivated.
    pub max_creates_per_tick: u32,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            ceiling: 20,
            batch_size: 3,
            tick: Duration::from_secs(5),
            idle_delay: Duration::from_secs(30),
            scale_up: ScaleUpMode::CapacityAware,
            scale_down: ScaleDownMode::QueueEmpty,
            max_creates_per_tick: 1,
        }
    }
}
