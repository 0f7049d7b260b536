use crate::resilience::{BreakerRegistry, BreakerSettings};
use crate::telemetry::{MetricsSink, RecorderMetricsSink};
use crate::Result;
use std::sync::Arc;

use super::core::Executor;

/// Environment variable naming a YAML or JSON breaker settings file.
pub const SETTINGS_ENV: &str = "CIRCUIT_GUARD_SETTINGS";

/// Builder for executors with an injected registry and metrics sink.
pub struct ExecutorBuilder {
    registry: Option<Arc<BreakerRegistry>>,
    settings: BreakerSettings,
    metrics: Arc<dyn MetricsSink>,
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            settings: BreakerSettings::default(),
            metrics: Arc::new(RecorderMetricsSink::new()),
        }
    }

    /// Share an existing registry (and therefore breaker state) with other executors.
    /// Takes precedence over [`ExecutorBuilder::with_settings`].
    pub fn with_registry(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Policy for the breakers of a fresh registry.
    pub fn with_settings(mut self, settings: BreakerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Load breaker settings from the file named by `CIRCUIT_GUARD_SETTINGS`.
    /// Leaves the current settings untouched when the variable is unset.
    pub fn settings_from_env(self) -> Result<Self> {
        self.settings_from_path(std::env::var(SETTINGS_ENV).ok().as_deref())
    }

    fn settings_from_path(self, path: Option<&str>) -> Result<Self> {
        match path.map(str::trim) {
            Some(path) if !path.is_empty() => {
                let settings = BreakerSettings::from_file(path)?;
                Ok(self.with_settings(settings))
            }
            _ => Ok(self),
        }
    }

    /// Inject a metrics sink. Default forwards to the `metrics` facade.
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn build(self) -> Executor {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(BreakerRegistry::with_settings(self.settings)));
        Executor {
            registry,
            metrics: self.metrics,
        }
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
