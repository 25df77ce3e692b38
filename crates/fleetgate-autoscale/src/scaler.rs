//! Fleet scaler — queue-depth driven instance scaling.
//!
//! Each tick samples the request queue depth and the fleet's active count,
//! turns them into a [`ScaleDecision`] with [`FleetScaler::evaluate`], and
//! then carries the decision out against the provisioner. Nothing about the
//! fleet is cached between ticks; only the idle timer survives.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use fleetgate_core::{InstanceId, LaunchTemplate, ScaleDownMode, ScaleUpMode, ScalingPolicy};
use fleetgate_fleet::FleetDirectory;
use fleetgate_metrics::{ControllerMetrics, Counter, Gauge};
use fleetgate_queue::MessageQueue;

use crate::error::ScaleResult;

/// A scaling decision for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Add up to this many active instances.
    ScaleUp(u32),
    /// Stop up to this many running instances.
    ScaleDown(u32),
    /// Over-provisioned, but not for long enough yet.
    AwaitingIdle,
    /// No change needed.
    NoChange,
}

/// What one tick observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub pending: u64,
    pub active: u32,
    pub decision: ScaleDecision,
    pub started: Vec<InstanceId>,
    pub created: Vec<InstanceId>,
    pub stopped: Vec<InstanceId>,
}

impl TickReport {
    fn new(pending: u64, active: u32, decision: ScaleDecision) -> Self {
        Self {
            pending,
            active,
            decision,
            started: Vec::new(),
            created: Vec::new(),
            stopped: Vec::new(),
        }
    }
}

/// Grows and shrinks the worker fleet to follow the request queue.
pub struct FleetScaler {
    requests: Arc<dyn MessageQueue>,
    directory: FleetDirectory,
    template: LaunchTemplate,
    policy: ScalingPolicy,
    metrics: Arc<ControllerMetrics>,
    /// Set while the fleet is over-provisioned; when that was first seen
    /// (or when the last scale-down happened).
    idle_since: Option<Instant>,
}

impl FleetScaler {
    pub fn new(
        requests: Arc<dyn MessageQueue>,
        directory: FleetDirectory,
        template: LaunchTemplate,
        policy: ScalingPolicy,
        metrics: Arc<ControllerMetrics>,
    ) -> Self {
        Self {
            requests,
            directory,
            template,
            policy,
            metrics,
            idle_since: None,
        }
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Decide what to do given the queue depth and active count at `now`.
    ///
    /// Only touches the idle timer; never calls out.
    pub fn evaluate(&mut self, pending: u64, active: u32, now: Instant) -> ScaleDecision {
        let policy = &self.policy;
        let pending_u32 = u32::try_from(pending).unwrap_or(u32::MAX);

        let excess = match policy.scale_down {
            ScaleDownMode::QueueEmpty if pending == 0 && active > 0 => Some(active),
            ScaleDownMode::PendingBelowActive if pending_u32 < active => {
                Some(active - pending_u32)
            }
            _ => None,
        };

        if let Some(excess) = excess {
            return match self.idle_since {
                None => {
                    self.idle_since = Some(now);
                    debug!(pending, active, "fleet over-provisioned, idle timer armed");
                    ScaleDecision::AwaitingIdle
                }
                Some(since) if now.saturating_duration_since(since) >= policy.idle_delay => {
                    self.idle_since = Some(now);
                    ScaleDecision::ScaleDown(excess.min(policy.batch_size))
                }
                Some(_) => ScaleDecision::AwaitingIdle,
            };
        }

        if self.idle_since.take().is_some() {
            debug!(pending, active, "idle timer disarmed");
        }

        if pending > 0 && active < policy.ceiling {
            let headroom = policy.ceiling - active;
            let want = match policy.scale_up {
                ScaleUpMode::CapacityAware => pending_u32.min(headroom),
                ScaleUpMode::FixedBatch => policy.batch_size.min(headroom),
            };
            return ScaleDecision::ScaleUp(want);
        }

        ScaleDecision::NoChange
    }

    /// Run one scaling tick.
    ///
    /// Any API error abandons the rest of the tick.
    pub async fn tick(&mut self) -> ScaleResult<TickReport> {
        let pending = self.requests.approximate_depth().await?;
        let active = self.directory.try_count_active().await?;
        self.metrics.set(Gauge::PendingDepth, pending);
        self.metrics.set(Gauge::ActiveInstances, u64::from(active));

        let decision = self.evaluate(pending, active, Instant::now());
        let mut report = TickReport::new(pending, active, decision);

        match decision {
            ScaleDecision::ScaleUp(want) => self.scale_up(want, &mut report).await?,
            ScaleDecision::ScaleDown(n) => self.scale_down(n, &mut report).await?,
            ScaleDecision::AwaitingIdle | ScaleDecision::NoChange => {}
        }

        Ok(report)
    }

    async fn scale_up(&self, want: u32, report: &mut TickReport) -> ScaleResult<()> {
        let stopped = self.directory.list_stopped().await?;

        if !stopped.is_empty() {
            let n = want.min(self.policy.batch_size) as usize;
            let ids: Vec<InstanceId> = stopped.into_iter().take(n).map(|i| i.id).collect();
            self.directory.provisioner().start_instances(&ids).await?;
            self.metrics.add(Counter::InstancesStarted, ids.len() as u64);
            info!(
                count = ids.len(),
                want,
                pending = report.pending,
                active = report.active,
                "reactivated stopped instances"
            );
            report.started = ids;
            return Ok(());
        }

        let n = want.min(self.policy.max_creates_per_tick);
        for _ in 0..n {
            let id = self
                .directory
                .provisioner()
                .create_instance(&self.template)
                .await?;
            self.metrics.incr(Counter::InstancesCreated);
            info!(
                instance = %id,
                pending = report.pending,
                active = report.active,
                "created instance"
            );
            report.created.push(id);
        }
        Ok(())
    }

    async fn scale_down(&self, n: u32, report: &mut TickReport) -> ScaleResult<()> {
        let running = self.directory.list_running().await?;
        let ids: Vec<InstanceId> = running.into_iter().take(n as usize).map(|i| i.id).collect();
        if ids.is_empty() {
            return Ok(());
        }

        self.directory.provisioner().stop_instances(&ids).await?;
        self.metrics.add(Counter::InstancesStopped, ids.len() as u64);
        info!(
            count = ids.len(),
            pending = report.pending,
            active = report.active,
            "stopped idle instances"
        );
        report.stopped = ids;
        Ok(())
    }

    /// Run the scaling loop until the shutdown signal fires.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_ms = self.policy.tick.as_millis() as u64,
            ceiling = self.policy.ceiling,
            batch_size = self.policy.batch_size,
            tag = %self.directory.tag(),
            "fleet scaler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.policy.tick) => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "scaling tick abandoned");
                        self.metrics.incr(Counter::ScaleTickFailures);
                    }
                }
                _ = shutdown.changed() => {
                    info!("fleet scaler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fleetgate_core::{FleetTag, InstanceState};
    use fleetgate_fleet::{MemoryProvisioner, ProvisionOp};
    use fleetgate_queue::{MemoryQueue, QueueOp};

    struct Harness {
        queue: MemoryQueue,
        provisioner: MemoryProvisioner,
        metrics: Arc<ControllerMetrics>,
        scaler: FleetScaler,
    }

    fn tag() -> FleetTag {
        FleetTag::new("Name", "app-tier-instance")
    }

    fn harness(policy: ScalingPolicy) -> Harness {
        let queue = MemoryQueue::new("requests", Duration::from_secs(30));
        let provisioner = MemoryProvisioner::manual();
        let metrics = Arc::new(ControllerMetrics::new());
        let directory = FleetDirectory::new(Arc::new(provisioner.clone()), tag());
        let template = LaunchTemplate {
            image_id: "ami-test".to_string(),
            instance_type: "t2.micro".to_string(),
            tag: tag(),
        };
        let scaler = FleetScaler::new(
            Arc::new(queue.clone()),
            directory,
            template,
            policy,
            metrics.clone(),
        );
        Harness {
            queue,
            provisioner,
            metrics,
            scaler,
        }
    }

    fn policy() -> ScalingPolicy {
        ScalingPolicy::default()
    }

    async fn enqueue(queue: &MemoryQueue, n: usize) {
        for i in 0..n {
            queue.send(format!("request-{i}")).await.unwrap();
        }
    }

    // ── evaluate ───────────────────────────────────────────────────

    #[test]
    fn capacity_aware_scales_by_pending() {
        let mut h = harness(policy());
        let now = Instant::now();
        assert_eq!(h.scaler.evaluate(7, 2, now), ScaleDecision::ScaleUp(7));
        assert_eq!(h.scaler.evaluate(50, 2, now), ScaleDecision::ScaleUp(18));
    }

    #[test]
    fn fixed_batch_scales_by_batch() {
        let mut h = harness(ScalingPolicy {
            scale_up: ScaleUpMode::FixedBatch,
            ..policy()
        });
        let now = Instant::now();
        assert_eq!(h.scaler.evaluate(50, 2, now), ScaleDecision::ScaleUp(3));
        assert_eq!(h.scaler.evaluate(50, 19, now), ScaleDecision::ScaleUp(1));
    }

    #[test]
    fn at_ceiling_no_change() {
        let mut h = harness(policy());
        assert_eq!(
            h.scaler.evaluate(100, 20, Instant::now()),
            ScaleDecision::NoChange
        );
    }

    #[test]
    fn empty_queue_and_empty_fleet_is_no_change() {
        let mut h = harness(policy());
        assert_eq!(h.scaler.evaluate(0, 0, Instant::now()), ScaleDecision::NoChange);
    }

    #[test]
    fn scale_down_waits_for_idle_delay() {
        let mut h = harness(policy());
        let t0 = Instant::now();

        assert_eq!(h.scaler.evaluate(0, 5, t0), ScaleDecision::AwaitingIdle);
        assert_eq!(
            h.scaler.evaluate(0, 5, t0 + Duration::from_secs(29)),
            ScaleDecision::AwaitingIdle
        );
        assert_eq!(
            h.scaler.evaluate(0, 5, t0 + Duration::from_secs(30)),
            ScaleDecision::ScaleDown(3)
        );
        // Re-armed: the next batch waits another full delay.
        assert_eq!(
            h.scaler.evaluate(0, 2, t0 + Duration::from_secs(35)),
            ScaleDecision::AwaitingIdle
        );
        assert_eq!(
            h.scaler.evaluate(0, 2, t0 + Duration::from_secs(60)),
            ScaleDecision::ScaleDown(2)
        );
    }

    #[test]
    fn new_work_disarms_idle_timer() {
        let mut h = harness(policy());
        let t0 = Instant::now();

        assert_eq!(h.scaler.evaluate(0, 4, t0), ScaleDecision::AwaitingIdle);
        assert_eq!(
            h.scaler.evaluate(2, 4, t0 + Duration::from_secs(20)),
            ScaleDecision::ScaleUp(2)
        );
        // The quiet period starts over.
        assert_eq!(
            h.scaler.evaluate(0, 4, t0 + Duration::from_secs(40)),
            ScaleDecision::AwaitingIdle
        );
    }

    #[test]
    fn pending_below_active_scales_down_the_excess() {
        let mut h = harness(ScalingPolicy {
            scale_down: ScaleDownMode::PendingBelowActive,
            idle_delay: Duration::from_secs(10),
            ..policy()
        });
        let t0 = Instant::now();

        assert_eq!(h.scaler.evaluate(3, 5, t0), ScaleDecision::AwaitingIdle);
        assert_eq!(
            h.scaler.evaluate(3, 5, t0 + Duration::from_secs(10)),
            ScaleDecision::ScaleDown(2)
        );
        // pending == active is neither over- nor under-provisioned.
        assert_eq!(
            h.scaler.evaluate(5, 5, t0 + Duration::from_secs(20)),
            ScaleDecision::ScaleUp(5)
        );
    }

    // ── tick ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn reuses_stopped_instance_before_creating() {
        let mut h = harness(policy());
        h.provisioner
            .insert("i-stopped", InstanceState::Stopped, &tag())
            .await;
        enqueue(&h.queue, 1).await;

        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.decision, ScaleDecision::ScaleUp(1));
        assert_eq!(report.started, vec!["i-stopped".to_string()]);
        assert!(report.created.is_empty());
        assert_eq!(h.provisioner.call_count(ProvisionOp::Create), 0);
        assert_eq!(
            h.provisioner.state_of("i-stopped").await,
            Some(InstanceState::Pending)
        );
        assert_eq!(h.metrics.counter(Counter::InstancesStarted), 1);
    }

    #[tokio::test]
    async fn start_is_capped_by_batch_size() {
        let mut h = harness(policy());
        for i in 0..5 {
            h.provisioner
                .insert(&format!("i-{i}"), InstanceState::Stopped, &tag())
                .await;
        }
        enqueue(&h.queue, 10).await;

        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.started, vec!["i-0", "i-1", "i-2"]);
        assert_eq!(h.provisioner.call_count(ProvisionOp::Start), 1);
    }

    #[tokio::test]
    async fn creates_one_per_call_when_nothing_is_stopped() {
        let mut h = harness(ScalingPolicy {
            max_creates_per_tick: 2,
            ..policy()
        });
        enqueue(&h.queue, 5).await;

        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.created.len(), 2);
        assert_eq!(h.provisioner.call_count(ProvisionOp::Create), 2);
        assert_eq!(h.metrics.counter(Counter::InstancesCreated), 2);
        assert_eq!(h.metrics.gauge(Gauge::PendingDepth), 5);
    }

    #[tokio::test]
    async fn ceiling_holds_across_ticks() {
        let mut h = harness(ScalingPolicy {
            ceiling: 4,
            max_creates_per_tick: 10,
            ..policy()
        });
        h.provisioner
            .insert("i-stopped-0", InstanceState::Stopped, &tag())
            .await;
        h.provisioner
            .insert("i-stopped-1", InstanceState::Stopped, &tag())
            .await;
        enqueue(&h.queue, 100).await;

        for _ in 0..6 {
            h.scaler.tick().await.unwrap();
            let active = h
                .provisioner
                .instances()
                .await
                .iter()
                .filter(|i| i.state.is_active())
                .count();
            assert!(active <= 4, "active {active} exceeds ceiling");
            h.provisioner.settle().await;
        }

        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.active, 4);
        assert_eq!(report.decision, ScaleDecision::NoChange);
    }

    #[tokio::test(start_paused = true)]
    async fn never_stops_on_first_quiet_tick() {
        let mut h = harness(policy());
        h.provisioner.insert("i-1", InstanceState::Running, &tag()).await;
        h.provisioner.insert("i-2", InstanceState::Running, &tag()).await;

        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.decision, ScaleDecision::AwaitingIdle);
        assert!(report.stopped.is_empty());
        assert_eq!(h.provisioner.call_count(ProvisionOp::Stop), 0);

        tokio::time::advance(Duration::from_secs(30)).await;
        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.decision, ScaleDecision::ScaleDown(2));
        assert_eq!(report.stopped, vec!["i-1", "i-2"]);
        assert_eq!(
            h.provisioner.state_of("i-1").await,
            Some(InstanceState::Stopped)
        );
        assert_eq!(h.metrics.counter(Counter::InstancesStopped), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scale_down_stops_one_batch_in_a_single_call() {
        let mut h = harness(policy());
        for i in 0..5 {
            h.provisioner
                .insert(&format!("i-{i}"), InstanceState::Running, &tag())
                .await;
        }

        assert_eq!(h.scaler.tick().await.unwrap().decision, ScaleDecision::AwaitingIdle);
        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(h.scaler.tick().await.unwrap().decision, ScaleDecision::AwaitingIdle);
        tokio::time::advance(Duration::from_secs(15)).await;

        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.decision, ScaleDecision::ScaleDown(3));
        assert_eq!(report.stopped, vec!["i-0", "i-1", "i-2"]);
        assert_eq!(h.provisioner.call_count(ProvisionOp::Stop), 1);
        assert_eq!(
            h.provisioner.state_of("i-3").await,
            Some(InstanceState::Running)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scale_down_skips_pending_instances() {
        let mut h = harness(policy());
        h.provisioner.insert("i-boot", InstanceState::Pending, &tag()).await;

        h.scaler.tick().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let report = h.scaler.tick().await.unwrap();

        assert_eq!(report.decision, ScaleDecision::ScaleDown(1));
        assert!(report.stopped.is_empty());
        assert_eq!(h.provisioner.call_count(ProvisionOp::Stop), 0);
    }

    #[tokio::test]
    async fn api_error_abandons_tick() {
        let mut h = harness(policy());
        enqueue(&h.queue, 3).await;

        h.queue.inject_failures(QueueOp::Depth, 1);
        assert!(h.scaler.tick().await.is_err());

        h.provisioner.inject_failures(ProvisionOp::Describe, 1);
        assert!(h.scaler.tick().await.is_err());
        assert_eq!(h.provisioner.call_count(ProvisionOp::Create), 0);

        let report = h.scaler.tick().await.unwrap();
        assert_eq!(report.created.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_counts_failed_ticks_and_stops_on_shutdown() {
        let mut h = harness(policy());
        h.queue.inject_failures(QueueOp::Depth, 2);
        let metrics = h.metrics.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { h.scaler.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(metrics.counter(Counter::ScaleTickFailures), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
