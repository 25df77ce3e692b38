//! Supervised background tasks.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fleetgate_core::config::SupervisorConfig;

/// Builds a fresh instance of a loop, given its shutdown signal.
pub type TaskFactory = Arc<dyn Fn(watch::Receiver<bool>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-loop supervisor state.
struct TaskSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    factory: TaskFactory,
    restarts: Arc<AtomicU32>,
}

/// How a supervisor shutdown went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Loops that exited within the grace period.
    pub stopped: Vec<String>,
    /// Loops that had to be aborted.
    pub aborted: Vec<String>,
}

/// Owns the named background loops of the process.
#[derive(Clone)]
pub struct Supervisor {
    tasks: Arc<RwLock<HashMap<String, TaskSlot>>>,
    restart_delay: Duration,
    shutdown_grace: Duration,
}

impl Supervisor {
    pub fn new(restart_delay: Duration, shutdown_grace: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            restart_delay,
            shutdown_grace,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.restart_delay, config.shutdown_grace)
    }

    /// Start a loop under `name`.
    ///
    /// `factory` is called once now and again after every panic. A loop
    /// already running under the same name is stopped and replaced.
    pub async fn spawn<F, Fut>(&self, name: &str, factory: F)
    where
        F: Fn(watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let factory: TaskFactory =
            Arc::new(move |rx: watch::Receiver<bool>| factory(rx).boxed());
        let slot = self.start_slot(name, factory, Arc::new(AtomicU32::new(0)));

        let old = self.tasks.write().await.insert(name.to_string(), slot);
        if let Some(old) = old {
            warn!(task = %name, "replacing running task");
            self.stop_slot(name, old).await;
        }
        info!(task = %name, "supervised task started");
    }

    /// Stop one loop and start it again from its factory.
    ///
    /// Returns `false` if no loop runs under `name`.
    pub async fn restart(&self, name: &str) -> bool {
        let Some(old) = self.tasks.write().await.remove(name) else {
            return false;
        };
        let factory = old.factory.clone();
        let restarts = old.restarts.clone();
        self.stop_slot(name, old).await;

        restarts.fetch_add(1, Ordering::SeqCst);
        let slot = self.start_slot(name, factory, restarts);
        self.tasks.write().await.insert(name.to_string(), slot);
        info!(task = %name, "supervised task restarted");
        true
    }

    /// Stop one loop. Returns `false` if no loop runs under `name`.
    pub async fn stop(&self, name: &str) -> bool {
        let Some(slot) = self.tasks.write().await.remove(name) else {
            return false;
        };
        self.stop_slot(name, slot).await;
        info!(task = %name, "supervised task stopped");
        true
    }

    /// Signal every loop, wait for them up to the grace period, then abort
    /// the rest.
    pub async fn shutdown(&self) -> ShutdownReport {
        let slots: Vec<(String, TaskSlot)> = self.tasks.write().await.drain().collect();
        for (_, slot) in &slots {
            let _ = slot.shutdown_tx.send(true);
        }

        let mut handles: Vec<(String, JoinHandle<()>)> = slots
            .into_iter()
            .map(|(name, slot)| (name, slot.handle))
            .collect();

        let waited = tokio::time::timeout(
            self.shutdown_grace,
            join_all(handles.iter_mut().map(|(_, h)| h)),
        )
        .await;
        if waited.is_err() {
            warn!(
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "shutdown grace period elapsed"
            );
        }

        let mut report = ShutdownReport::default();
        for (name, handle) in handles {
            if handle.is_finished() {
                report.stopped.push(name);
            } else {
                handle.abort();
                warn!(task = %name, "supervised task aborted");
                report.aborted.push(name);
            }
        }
        report.stopped.sort();
        report.aborted.sort();
        info!(
            stopped = report.stopped.len(),
            aborted = report.aborted.len(),
            "supervisor shut down"
        );
        report
    }

    /// Names of the loops currently owned, sorted.
    pub async fn active_tasks(&self) -> Vec<String> {
        let tasks = self.tasks.read().await;
        let mut names: Vec<String> = tasks
            .iter()
            .filter(|(_, slot)| !slot.handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn is_running(&self, name: &str) -> bool {
        let tasks = self.tasks.read().await;
        tasks.get(name).is_some_and(|slot| !slot.handle.is_finished())
    }

    /// Times the loop under `name` has been restarted, by panic or by
    /// [`restart`](Self::restart).
    pub async fn restart_count(&self, name: &str) -> Option<u32> {
        let tasks = self.tasks.read().await;
        tasks
            .get(name)
            .map(|slot| slot.restarts.load(Ordering::SeqCst))
    }

    fn start_slot(&self, name: &str, factory: TaskFactory, restarts: Arc<AtomicU32>) -> TaskSlot {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(supervise(
            name.to_string(),
            factory.clone(),
            shutdown_rx,
            self.restart_delay,
            restarts.clone(),
        ));
        TaskSlot {
            handle,
            shutdown_tx,
            factory,
            restarts,
        }
    }

    async fn stop_slot(&self, name: &str, mut slot: TaskSlot) {
        let _ = slot.shutdown_tx.send(true);
        if tokio::time::timeout(self.shutdown_grace, &mut slot.handle)
            .await
            .is_err()
        {
            slot.handle.abort();
            warn!(task = %name, "supervised task did not stop in time, aborted");
        }
    }
}

/// Run `factory`'s loop, rebuilding it after every panic until shutdown.
async fn supervise(
    name: String,
    factory: TaskFactory,
    mut shutdown: watch::Receiver<bool>,
    restart_delay: Duration,
    restarts: Arc<AtomicU32>,
) {
    loop {
        let task = factory(shutdown.clone());
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(()) => {
                debug!(task = %name, "supervised task exited");
                break;
            }
            Err(payload) => {
                if *shutdown.borrow() {
                    break;
                }
                error!(
                    task = %name,
                    panic = %panic_message(payload.as_ref()),
                    delay_ms = restart_delay.as_millis() as u64,
                    "supervised task panicked, restarting"
                );
                restarts.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    _ = tokio::time::sleep(restart_delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
