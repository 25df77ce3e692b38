//! fleetgate-metrics — observability for the controller.
//!
//! Lock-free counters and gauges shared (via `Arc`) by the gateway, the
//! queue poller, the fleet scaler and the idle drain, plus Prometheus text
//! exposition for the `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ControllerMetrics
//!   ├── incr()/add()  ← counters (submissions, results stored, instances started, ...)
//!   ├── set()/inc()/dec() ← gauges (queue depth, active instances, in-flight)
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{ControllerMetrics, Counter, Gauge, MetricsSnapshot};
pub use prometheus::render_prometheus;
