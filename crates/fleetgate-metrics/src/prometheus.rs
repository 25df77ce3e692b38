//! Prometheus text exposition format.

use crate::collector::{ControllerMetrics, Counter, Gauge};

const PREFIX: &str = "fleetgate_";

/// Render every counter and gauge in Prometheus text format.
pub fn render_prometheus(metrics: &ControllerMetrics) -> String {
    let mut out = String::new();

    for counter in Counter::ALL {
        push_metric(
            &mut out,
            counter.name(),
            counter.help(),
            "counter",
            metrics.counter(counter),
        );
    }
    for gauge in Gauge::ALL {
        push_metric(
            &mut out,
            gauge.name(),
            gauge.help(),
            "gauge",
            metrics.gauge(gauge),
        );
    }

    out
}

fn push_metric(out: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    out.push_str(&format!("# HELP {PREFIX}{name} {help}\n"));
    out.push_str(&format!("# TYPE {PREFIX}{name} {kind}\n"));
    out.push_str(&format!("{PREFIX}{name} {value}\n"));
}
