//! Submission gateway.
//!
//! Publishes one work item to the request queue and waits for the result
//! store to hold its answer. An identifier can have only one submission in
//! flight at a time; the guard is released however the submission ends,
//! including when the caller drops the future.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fleetgate_core::RequestMessage;
use fleetgate_metrics::{ControllerMetrics, Counter, Gauge};
use fleetgate_queue::MessageQueue;
use fleetgate_results::ResultStore;

use crate::error::{GatewayError, GatewayResult};

pub struct Gateway {
    requests: Arc<dyn MessageQueue>,
    store: ResultStore,
    metrics: Arc<ControllerMetrics>,
    deadline: Option<Duration>,
    cancel: CancellationToken,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Gateway {
    pub fn new(
        requests: Arc<dyn MessageQueue>,
        store: ResultStore,
        metrics: Arc<ControllerMetrics>,
        deadline: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        if deadline.is_none() {
            warn!("gateway deadline unset, submissions wait until answered or shut down");
        }
        Self {
            requests,
            store,
            metrics,
            deadline,
            cancel,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn requests(&self) -> &Arc<dyn MessageQueue> {
        &self.requests
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<ControllerMetrics> {
        &self.metrics
    }

    /// Number of submissions currently waiting for a result.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Submit one work item and wait for its result.
    pub async fn submit(&self, identifier: &str, payload: &[u8]) -> GatewayResult<String> {
        if payload.is_empty() {
            return Err(GatewayError::EmptyPayload);
        }
        if identifier.trim().is_empty() {
            return Err(GatewayError::InvalidIdentifier(identifier.to_string()));
        }

        let _guard = match InFlightGuard::acquire(self, identifier) {
            Some(g) => g,
            None => {
                self.metrics.incr(Counter::Conflicts);
                warn!(%identifier, "submission rejected, identifier already in flight");
                return Err(GatewayError::InFlight(identifier.to_string()));
            }
        };
        self.metrics.incr(Counter::Submissions);

        // With no submission in flight for this identifier, anything stored
        // under it is a leftover redelivery.
        if let Some(stale) = self.store.take(identifier).await {
            debug!(%identifier, %stale, "discarded stale result");
        }

        let body = serde_json::to_string(&RequestMessage::new(identifier, payload))?;
        if let Err(e) = self.requests.send(body).await {
            self.metrics.incr(Counter::PublishFailures);
            error!(%identifier, error = %e, "failed to publish request");
            return Err(e.into());
        }
        debug!(%identifier, bytes = payload.len(), "request published");

        match self
            .store
            .wait_for(identifier, self.deadline, &self.cancel)
            .await
        {
            Ok(result) => {
                self.metrics.incr(Counter::Completions);
                info!(%identifier, %result, "request answered");
                Ok(result)
            }
            Err(e) => {
                let e = GatewayError::from(e);
                match &e {
                    GatewayError::DeadlineExceeded { .. } => {
                        self.metrics.incr(Counter::DeadlineExceeded);
                        warn!(%identifier, error = %e, "request timed out");
                    }
                    _ => {
                        self.metrics.incr(Counter::Cancelled);
                        debug!(%identifier, "request cancelled");
                    }
                }
                Err(e)
            }
        }
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds an identifier in the in-flight set until dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    metrics: Arc<ControllerMetrics>,
    identifier: String,
}

impl InFlightGuard {
    fn acquire(gateway: &Gateway, identifier: &str) -> Option<Self> {
        if !lock(&gateway.in_flight).insert(identifier.to_string()) {
            return None;
        }
        gateway.metrics.inc(Gauge::InFlight);
        Some(Self {
            set: gateway.in_flight.clone(),
            metrics: gateway.metrics.clone(),
            identifier: identifier.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.identifier);
        self.metrics.dec(Gauge::InFlight);
    }
}
