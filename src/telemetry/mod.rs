//! 指标模块：命令结果计数与延迟观测的输出端。
//!
//! Outcome metrics sinks.
//!
//! The executor records two instruments per command: a counter keyed by
//! `(name, outcome-label)` and a latency histogram keyed by `name`. Where they end up
//! is decided by the [`MetricsSink`] the executor is built with.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MetricsSink`] | Trait for metric destinations |
//! | [`NoopMetricsSink`] | Drops everything |
//! | [`InMemoryMetricsSink`] | Keeps counters and observations, for tests and inspection |
//! | [`CompositeMetricsSink`] | Fans out to several sinks |
//! | [`RecorderMetricsSink`] | Forwards to the `metrics` facade (Prometheus exporters etc.) |

mod recorder;

pub use recorder::{RecorderMetricsSink, LATENCY_HISTOGRAM, REQUESTS_COUNTER};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Destination for command metrics. Implementations must be cheap and must not block.
pub trait MetricsSink: Send + Sync {
    /// Count one occurrence of `label` for the breaker `name`.
    fn increment(&self, name: &str, label: &str);

    /// Record the admission-to-finalization latency of one command.
    fn observe_latency(&self, name: &str, elapsed: Duration);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _: &str, _: &str) {}
    fn observe_latency(&self, _: &str, _: Duration) {}
}

pub fn noop_sink() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetricsSink)
}

#[derive(Default)]
struct Recorded {
    counters: HashMap<(String, String), u64>,
    latencies: Vec<(String, Duration)>,
}

/// In-memory sink for testing.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    recorded: RwLock<Recorded>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the `(name, label)` counter.
    pub fn count(&self, name: &str, label: &str) -> u64 {
        self.read(|r| {
            r.counters
                .get(&(name.to_string(), label.to_string()))
                .copied()
                .unwrap_or(0)
        })
    }

    /// Sum of every counter recorded for `name`.
    pub fn total(&self, name: &str) -> u64 {
        self.read(|r| {
            r.counters
                .iter()
                .filter(|((n, _), _)| n == name)
                .map(|(_, v)| *v)
                .sum()
        })
    }

    /// All `(label, value)` pairs for `name`, sorted by label.
    pub fn counters(&self, name: &str) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> = self.read(|r| {
            r.counters
                .iter()
                .filter(|((n, _), _)| n == name)
                .map(|((_, label), v)| (label.clone(), *v))
                .collect()
        });
        out.sort();
        out
    }

    pub fn latencies(&self, name: &str) -> Vec<Duration> {
        self.read(|r| {
            r.latencies
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, d)| *d)
                .collect()
        })
    }

    pub fn clear(&self) {
        let mut r = self.recorded.write().unwrap_or_else(PoisonError::into_inner);
        r.counters.clear();
        r.latencies.clear();
    }

    fn read<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        let recorded = self.recorded.read().unwrap_or_else(PoisonError::into_inner);
        f(&*recorded)
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn increment(&self, name: &str, label: &str) {
        let mut r = self.recorded.write().unwrap_or_else(PoisonError::into_inner);
        *r.counters
            .entry((name.to_string(), label.to_string()))
            .or_insert(0) += 1;
    }

    fn observe_latency(&self, name: &str, elapsed: Duration) {
        let mut r = self.recorded.write().unwrap_or_else(PoisonError::into_inner);
        r.latencies.push((name.to_string(), elapsed));
    }
}

/// Composite sink for multiple destinations.
#[derive(Default)]
pub struct CompositeMetricsSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl CompositeMetricsSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for CompositeMetricsSink {
    fn increment(&self, name: &str, label: &str) {
        for s in &self.sinks {
            s.increment(name, label);
        }
    }

    fn observe_latency(&self, name: &str, elapsed: Duration) {
        for s in &self.sinks {
            s.observe_latency(name, elapsed);
        }
    }
}
