use super::MetricsSink;
use std::time::Duration;

/// Counter of finalized commands, labelled by `name` and `state` (the outcome label).
pub const REQUESTS_COUNTER: &str = "circuit_guard_requests_total";

/// Histogram of command latency in seconds, labelled by `name`.
pub const LATENCY_HISTOGRAM: &str = "circuit_guard_request_latency_seconds";

/// Forwards to whatever recorder is installed for the `metrics` facade.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetricsSink;

impl RecorderMetricsSink {
    pub fn new() -> Self {
        Self
    }

    /// Attach help text to both instruments on the installed recorder.
    pub fn describe() {
        metrics::describe_counter!(REQUESTS_COUNTER, "circuit-guard command count by outcome.");
        metrics::describe_histogram!(
            LATENCY_HISTOGRAM,
            metrics::Unit::Seconds,
            "circuit-guard command latency."
        );
    }
}

impl MetricsSink for RecorderMetricsSink {
    fn increment(&self, name: &str, label: &str) {
        metrics::counter!(
            REQUESTS_COUNTER,
            "name" => name.to_string(),
            "state" => label.to_string()
        )
        .increment(1);
    }

    fn observe_latency(&self, name: &str, elapsed: Duration) {
        metrics::histogram!(LATENCY_HISTOGRAM, "name" => name.to_string())
            .record(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    #[test]
    fn test_forwards_to_installed_recorder() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            RecorderMetricsSink::describe();
            let sink = RecorderMetricsSink::new();
            sink.increment("svc", "circuit-open");
            sink.observe_latency("svc", Duration::from_millis(250));
        });

        let entries = snapshotter.snapshot().into_vec();
        assert_eq!(entries.len(), 2);

        let (counter, _, _, value) = entries
            .iter()
            .find(|(key, ..)| key.kind() == MetricKind::Counter)
            .unwrap();
        assert_eq!(counter.key().name(), REQUESTS_COUNTER);
        let labels: Vec<(&str, &str)> = counter
            .key()
            .labels()
            .map(|l| (l.key(), l.value()))
            .collect();
        assert_eq!(labels, vec![("name", "svc"), ("state", "circuit-open")]);
        assert_eq!(value, &DebugValue::Counter(1));

        let (histogram, unit, _, value) = entries
            .iter()
            .find(|(key, ..)| key.kind() == MetricKind::Histogram)
            .unwrap();
        assert_eq!(histogram.key().name(), LATENCY_HISTOGRAM);
        assert_eq!(unit, &Some(metrics::Unit::Seconds));
        let labels: Vec<(&str, &str)> = histogram
            .key()
            .labels()
            .map(|l| (l.key(), l.value()))
            .collect();
        assert_eq!(labels, vec![("name", "svc")]);
        let DebugValue::Histogram(samples) = value else {
            panic!("latency should be a histogram");
        };
        assert_eq!(samples.len(), 1);
        assert!((samples[0].into_inner() - 0.25).abs() < 1e-9);
    }
}
