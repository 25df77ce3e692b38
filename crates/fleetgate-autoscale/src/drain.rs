//! Idle drain for the result store.
//!
//! Clears every stored result once the fleet has been seen with no active
//! instances on two consecutive ticks. The first zero arms the drain, the
//! second clears; any non-zero count disarms it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleetgate_fleet::FleetDirectory;
use fleetgate_metrics::{ControllerMetrics, Counter, Gauge};
use fleetgate_results::ResultStore;

/// What one drain tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The fleet has active instances.
    Disarmed,
    /// First zero observation.
    Armed,
    /// Second (or later) consecutive zero; this many entries were dropped.
    Cleared(usize),
    /// The fleet could not be counted.
    Skipped,
}

pub struct ResultDrain {
    directory: FleetDirectory,
    store: ResultStore,
    metrics: Arc<ControllerMetrics>,
    interval: Duration,
    armed: bool,
}

impl ResultDrain {
    pub fn new(
        directory: FleetDirectory,
        store: ResultStore,
        metrics: Arc<ControllerMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            directory,
            store,
            metrics,
            interval,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub async fn tick(&mut self) -> DrainOutcome {
        let active = match self.directory.try_count_active().await {
            Ok(n) => n,
            Err(e) => {
                // An unknown count is not a zero count.
                warn!(error = %e, "drain skipped, fleet count unavailable");
                self.armed = false;
                return DrainOutcome::Skipped;
            }
        };

        if active > 0 {
            if self.armed {
                debug!(active, "drain disarmed");
            }
            self.armed = false;
            return DrainOutcome::Disarmed;
        }

        if !self.armed {
            self.armed = true;
            debug!("fleet idle, drain armed");
            return DrainOutcome::Armed;
        }

        let cleared = self.store.clear().await;
        self.metrics.incr(Counter::Drains);
        self.metrics.set(Gauge::StoredResults, 0);
        info!(cleared, "fleet idle on consecutive ticks, result store drained");
        DrainOutcome::Cleared(cleared)
    }

    /// Run the drain loop until the shutdown signal fires.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "result drain started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("result drain shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use fleetgate_core::{FleetTag, InstanceState};
    use fleetgate_fleet::{MemoryProvisioner, ProvisionOp, Provisioner};

    fn tag() -> FleetTag {
        FleetTag::new("Name", "app-tier-instance")
    }

    fn setup() -> (MemoryProvisioner, ResultStore, Arc<ControllerMetrics>, ResultDrain) {
        let provisioner = MemoryProvisioner::manual();
        let store = ResultStore::new();
        let metrics = Arc::new(ControllerMetrics::new());
        let drain = ResultDrain::new(
            FleetDirectory::new(Arc::new(provisioner.clone()), tag()),
            store.clone(),
            metrics.clone(),
            Duration::from_secs(30),
        );
        (provisioner, store, metrics, drain)
    }

    #[tokio::test]
    async fn clears_only_on_second_consecutive_zero() {
        let (_p, store, metrics, mut drain) = setup();
        store.insert("cat1", "dog").await;

        assert_eq!(drain.tick().await, DrainOutcome::Armed);
        assert_eq!(store.len().await, 1);

        assert_eq!(drain.tick().await, DrainOutcome::Cleared(1));
        assert!(store.is_empty().await);
        assert_eq!(metrics.counter(Counter::Drains), 1);
    }

    #[tokio::test]
    async fn active_instance_resets_the_debounce() {
        let (p, store, _metrics, mut drain) = setup();
        store.insert("cat1", "dog").await;

        assert_eq!(drain.tick().await, DrainOutcome::Armed);

        p.insert("i-1", InstanceState::Running, &tag()).await;
        assert_eq!(drain.tick().await, DrainOutcome::Disarmed);
        assert!(!drain.is_armed());

        p.stop_instances(&["i-1".to_string()]).await.unwrap();
        assert_eq!(drain.tick().await, DrainOutcome::Armed);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn stays_armed_while_idle() {
        let (_p, store, _metrics, mut drain) = setup();
        drain.tick().await;
        drain.tick().await;

        store.insert("late", "cat").await;
        assert_eq!(drain.tick().await, DrainOutcome::Cleared(1));
    }

    #[tokio::test]
    async fn count_failure_is_not_a_zero() {
        let (p, store, _metrics, mut drain) = setup();
        store.insert("cat1", "dog").await;

        assert_eq!(drain.tick().await, DrainOutcome::Armed);
        p.inject_failures(ProvisionOp::Describe, 1);
        assert_eq!(drain.tick().await, DrainOutcome::Skipped);
        assert_eq!(drain.tick().await, DrainOutcome::Armed);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_drains_after_two_intervals() {
        let (_p, store, _metrics, mut drain) = setup();
        store.insert("cat1", "dog").await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { drain.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.len().await, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(store.is_empty().await);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
