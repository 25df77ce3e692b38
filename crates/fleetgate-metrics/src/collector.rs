//! Counter and gauge storage.
//!
//! One `AtomicU64` per metric, indexed by the `Counter`/`Gauge` enums, so
//! recording never takes a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::trace;

/// Monotonic controller counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Submissions,
    Completions,
    DeadlineExceeded,
    Cancelled,
    Conflicts,
    PublishFailures,
    ResultsStored,
    MalformedMessages,
    DeleteFailures,
    ReceiveFailures,
    InstancesStarted,
    InstancesCreated,
    InstancesStopped,
    ScaleTickFailures,
    Drains,
}

impl Counter {
    pub const ALL: [Counter; 15] = [
        Counter::Submissions,
        Counter::Completions,
        Counter::DeadlineExceeded,
        Counter::Cancelled,
        Counter::Conflicts,
        Counter::PublishFailures,
        Counter::ResultsStored,
        Counter::MalformedMessages,
        Counter::DeleteFailures,
        Counter::ReceiveFailures,
        Counter::InstancesStarted,
        Counter::InstancesCreated,
        Counter::InstancesStopped,
        Counter::ScaleTickFailures,
        Counter::Drains,
    ];

    /// Exposition name, without the `fleetgate_` prefix.
    pub fn name(self) -> &'static str {
        match self {
            Counter::Submissions => "submissions_total",
            Counter::Completions => "completions_total",
            Counter::DeadlineExceeded => "deadline_exceeded_total",
            Counter::Cancelled => "cancelled_total",
            Counter::Conflicts => "conflicts_total",
            Counter::PublishFailures => "publish_failures_total",
            Counter::ResultsStored => "results_stored_total",
            Counter::MalformedMessages => "malformed_messages_total",
            Counter::DeleteFailures => "delete_failures_total",
            Counter::ReceiveFailures => "receive_failures_total",
            Counter::InstancesStarted => "instances_started_total",
            Counter::InstancesCreated => "instances_created_total",
            Counter::InstancesStopped => "instances_stopped_total",
            Counter::ScaleTickFailures => "scale_tick_failures_total",
            Counter::Drains => "drains_total",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Counter::Submissions => "Work items accepted by the gateway.",
            Counter::Completions => "Work items answered with a result.",
            Counter::DeadlineExceeded => "Submissions that gave up waiting for a result.",
            Counter::Cancelled => "Submissions cancelled by shutdown.",
            Counter::Conflicts => "Submissions rejected because the identifier was in flight.",
            Counter::PublishFailures => "Failed publishes to the request queue.",
            Counter::ResultsStored => "Response messages written to the result store.",
            Counter::MalformedMessages => "Response messages that failed to parse.",
            Counter::DeleteFailures => "Response messages that could not be deleted.",
            Counter::ReceiveFailures => "Failed receives from the response queue.",
            Counter::InstancesStarted => "Stopped instances reactivated.",
            Counter::InstancesCreated => "Fresh instances created.",
            Counter::InstancesStopped => "Running instances stopped.",
            Counter::ScaleTickFailures => "Scaling ticks abandoned on an API error.",
            Counter::Drains => "Result store clears by the idle drain.",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Point-in-time controller gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gauge {
    PendingDepth,
    ActiveInstances,
    InFlight,
    StoredResults,
}

impl Gauge {
    pub const ALL: [Gauge; 4] = [
        Gauge::PendingDepth,
        Gauge::ActiveInstances,
        Gauge::InFlight,
        Gauge::StoredResults,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Gauge::PendingDepth => "request_queue_depth",
            Gauge::ActiveInstances => "active_instances",
            Gauge::InFlight => "in_flight_requests",
            Gauge::StoredResults => "stored_results",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Gauge::PendingDepth => "Approximate request queue depth at the last scaling tick.",
            Gauge::ActiveInstances => "Pending plus running instances at the last scaling tick.",
            Gauge::InFlight => "Submissions currently waiting for a result.",
            Gauge::StoredResults => "Entries held in the result store.",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Shared controller metrics.
pub struct ControllerMetrics {
    counters: [AtomicU64; Counter::ALL.len()],
    gauges: [AtomicU64; Gauge::ALL.len()],
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            gauges: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        if n == 0 {
            return;
        }
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
        trace!(metric = counter.name(), n, "counter incremented");
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn set(&self, gauge: Gauge, value: u64) {
        self.gauges[gauge.index()].store(value, Ordering::Relaxed);
    }

    pub fn inc(&self, gauge: Gauge) {
        self.gauges[gauge.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement a gauge, saturating at zero.
    pub fn dec(&self, gauge: Gauge) {
        let _ = self.gauges[gauge.index()].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |v| Some(v.saturating_sub(1)),
        );
    }

    pub fn gauge(&self, gauge: Gauge) -> u64 {
        self.gauges[gauge.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: Counter::ALL.iter().map(|&c| (c, self.counter(c))).collect(),
            gauges: Gauge::ALL.iter().map(|&g| (g, self.gauge(g))).collect(),
        }
    }
}

/// Copy of every metric value at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<(Counter, u64)>,
    pub gauges: Vec<(Gauge, u64)>,
}

impl MetricsSnapshot {
    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters
            .iter()
            .find(|(c, _)| *c == counter)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    pub fn gauge(&self, gauge: Gauge) -> u64 {
        self.gauges
            .iter()
            .find(|(g, _)| *g == gauge)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = ControllerMetrics::new();
        metrics.incr(Counter::Submissions);
        metrics.incr(Counter::Submissions);
        metrics.add(Counter::InstancesStarted, 3);
        assert_eq!(metrics.counter(Counter::Submissions), 2);
        assert_eq!(metrics.counter(Counter::InstancesStarted), 3);
        assert_eq!(metrics.counter(Counter::Drains), 0);
    }

    #[test]
    fn gauges_set_and_saturate() {
        let metrics = ControllerMetrics::new();
        metrics.set(Gauge::PendingDepth, 7);
        assert_eq!(metrics.gauge(Gauge::PendingDepth), 7);

        metrics.inc(Gauge::InFlight);
        metrics.dec(Gauge::InFlight);
        metrics.dec(Gauge::InFlight);
        assert_eq!(metrics.gauge(Gauge::InFlight), 0);
    }

    #[test]
    fn enum_order_matches_index() {
        for (i, c) in Counter::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
        for (i, g) in Gauge::ALL.iter().enumerate() {
            assert_eq!(g.index(), i);
        }
    }

    #[test]
    fn snapshot_reads_all_metrics() {
        let metrics = ControllerMetrics::new();
        metrics.add(Counter::ResultsStored, 4);
        metrics.set(Gauge::ActiveInstances, 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.counters.len(), Counter::ALL.len());
        assert_eq!(snap.counter(Counter::ResultsStored), 4);
        assert_eq!(snap.gauge(Gauge::ActiveInstances), 2);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["counters"][6][0], "results_stored");
    }
}
