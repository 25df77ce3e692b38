//! In-process provisioner.
//!
//! Keeps instances in launch order. Pending instances become running once
//! `boot_delay` has elapsed (checked lazily on every call) or when
//! [`MemoryProvisioner::settle`] is called.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use fleetgate_core::{FleetTag, InstanceId, InstanceState, LaunchTemplate, WorkerInstance};

use crate::error::{ProvisionError, ProvisionResult};
use crate::provisioner::Provisioner;

/// Provisioning calls that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOp {
    Describe,
    Start,
    Stop,
    Create,
}

impl ProvisionOp {
    fn index(self) -> usize {
        self as usize
    }
}

struct Record {
    instance: WorkerInstance,
    /// When the instance last entered pending.
    pending_since: Instant,
}

struct Inner {
    records: Mutex<Vec<Record>>,
    boot_delay: Option<Duration>,
    faults: [AtomicU32; 4],
    calls: [AtomicU32; 4],
}

/// In-memory [`Provisioner`].
///
/// Cheap to clone; clones share the same fleet.
#[derive(Clone)]
pub struct MemoryProvisioner {
    inner: Arc<Inner>,
}

impl MemoryProvisioner {
    /// A provisioner whose pending instances boot after `boot_delay`.
    pub fn new(boot_delay: Duration) -> Self {
        Self::build(Some(boot_delay))
    }

    /// A provisioner whose pending instances only boot on [`settle`](Self::settle).
    pub fn manual() -> Self {
        Self::build(None)
    }

    fn build(boot_delay: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(Vec::new()),
                boot_delay,
                faults: std::array::from_fn(|_| AtomicU32::new(0)),
                calls: std::array::from_fn(|_| AtomicU32::new(0)),
            }),
        }
    }

    /// Add an existing instance, e.g. one left over from a previous run.
    pub async fn insert(&self, id: &str, state: InstanceState, tag: &FleetTag) {
        let mut records = self.inner.records.lock().await;
        records.push(Record {
            instance: WorkerInstance {
                id: id.to_string(),
                state,
                tag: tag.clone(),
            },
            pending_since: Instant::now(),
        });
    }

    /// Move every pending instance to running.
    pub async fn settle(&self) {
        let mut records = self.inner.records.lock().await;
        for r in records.iter_mut() {
            if r.instance.state == InstanceState::Pending {
                r.instance.state = InstanceState::Running;
            }
        }
    }

    /// Every instance, regardless of tag.
    pub async fn instances(&self) -> Vec<WorkerInstance> {
        let mut records = self.inner.records.lock().await;
        self.boot_elapsed(&mut records);
        records.iter().map(|r| r.instance.clone()).collect()
    }

    pub async fn state_of(&self, id: &str) -> Option<InstanceState> {
        let mut records = self.inner.records.lock().await;
        self.boot_elapsed(&mut records);
        records
            .iter()
            .find(|r| r.instance.id == id)
            .map(|r| r.instance.state)
    }

    /// Make the next `times` calls of `op` fail.
    pub fn inject_failures(&self, op: ProvisionOp, times: u32) {
        self.inner.faults[op.index()].store(times, Ordering::SeqCst);
    }

    /// How many times `op` has been called, failed calls included.
    pub fn call_count(&self, op: ProvisionOp) -> u32 {
        self.inner.calls[op.index()].load(Ordering::SeqCst)
    }

    fn enter(&self, op: ProvisionOp) -> bool {
        self.inner.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        self.inner.faults[op.index()]
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn boot_elapsed(&self, records: &mut [Record]) {
        let Some(delay) = self.inner.boot_delay else {
            return;
        };
        let now = Instant::now();
        for r in records.iter_mut() {
            if r.instance.state == InstanceState::Pending && now - r.pending_since >= delay {
                r.instance.state = InstanceState::Running;
                debug!(instance = %r.instance.id, "instance booted");
            }
        }
    }
}

/// Index of every id in `records`, or the first unknown id.
fn locate(records: &[Record], ids: &[InstanceId]) -> ProvisionResult<Vec<usize>> {
    ids.iter()
        .map(|id| {
            records
                .iter()
                .position(|r| &r.instance.id == id)
                .ok_or_else(|| ProvisionError::UnknownInstance(id.clone()))
        })
        .collect()
}

#[async_trait]
impl Provisioner for MemoryProvisioner {
    async fn describe_instances(
        &self,
        tag: &FleetTag,
        states: &[InstanceState],
    ) -> ProvisionResult<Vec<WorkerInstance>> {
        if self.enter(ProvisionOp::Describe) {
            return Err(ProvisionError::Describe("injected failure".to_string()));
        }
        let mut records = self.inner.records.lock().await;
        self.boot_elapsed(&mut records);
        Ok(records
            .iter()
            .filter(|r| &r.instance.tag == tag && states.contains(&r.instance.state))
            .map(|r| r.instance.clone())
            .collect())
    }

    async fn start_instances(&self, ids: &[InstanceId]) -> ProvisionResult<()> {
        if self.enter(ProvisionOp::Start) {
            return Err(ProvisionError::Start("injected failure".to_string()));
        }
        let mut records = self.inner.records.lock().await;
        self.boot_elapsed(&mut records);
        let positions = locate(&records, ids)?;

        // Validate the whole batch before changing anything.
        for &i in &positions {
            let inst = &records[i].instance;
            if inst.state == InstanceState::Terminated {
                return Err(ProvisionError::InvalidTransition {
                    id: inst.id.clone(),
                    from: inst.state,
                    action: "start",
                });
            }
        }

        let now = Instant::now();
        for &i in &positions {
            let r = &mut records[i];
            if r.instance.state == InstanceState::Stopped {
                r.instance.state = InstanceState::Pending;
                r.pending_since = now;
            }
        }
        info!(count = ids.len(), "instances started");
        Ok(())
    }

    async fn stop_instances(&self, ids: &[InstanceId]) -> ProvisionResult<()> {
        if self.enter(ProvisionOp::Stop) {
            return Err(ProvisionError::Stop("injected failure".to_string()));
        }
        let mut records = self.inner.records.lock().await;
        self.boot_elapsed(&mut records);
        let positions = locate(&records, ids)?;

        for &i in &positions {
            let inst = &records[i].instance;
            if matches!(inst.state, InstanceState::Pending | InstanceState::Terminated) {
                return Err(ProvisionError::InvalidTransition {
                    id: inst.id.clone(),
                    from: inst.state,
                    action: "stop",
                });
            }
        }

        for &i in &positions {
            records[i].instance.state = InstanceState::Stopped;
        }
        info!(count = ids.len(), "instances stopped");
        Ok(())
    }

    async fn create_instance(&self, template: &LaunchTemplate) -> ProvisionResult<InstanceId> {
        if self.enter(ProvisionOp::Create) {
            return Err(ProvisionError::Create("injected failure".to_string()));
        }
        let simple = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("i-{}", &simple[..17]);
        let mut records = self.inner.records.lock().await;
        records.push(Record {
            instance: WorkerInstance {
                id: id.clone(),
                state: InstanceState::Pending,
                tag: template.tag.clone(),
            },
            pending_since: Instant::now(),
        });
        info!(
            instance = %id,
            image = %template.image_id,
            instance_type = %template.instance_type,
            "instance created"
        );
        Ok(id)
    }
}
