//! Breaker settings and their file formats.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::circuit_breaker::Counts;

/// Decides when a closed breaker trips open. Evaluated after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripPolicy {
    /// Trip once `consecutive_failures` is reached *and* the failure ratio since the
    /// last reset is at least `failure_ratio`.
    ConsecutiveWithRatio {
        consecutive_failures: u32,
        failure_ratio: f64,
    },
    /// Trip once `failures` consecutive failures are seen.
    Consecutive { failures: u32 },
}

impl TripPolicy {
    pub fn ready_to_trip(&self, counts: &Counts) -> bool {
        match *self {
            TripPolicy::ConsecutiveWithRatio {
                consecutive_failures,
                failure_ratio,
            } => {
                if counts.requests == 0 {
                    return false;
                }
                let ratio = counts.total_failures as f64 / counts.requests as f64;
                counts.consecutive_failures >= consecutive_failures && ratio >= failure_ratio
            }
            TripPolicy::Consecutive { failures } => counts.consecutive_failures >= failures,
        }
    }
}

impl Default for TripPolicy {
    fn default() -> Self {
        TripPolicy::ConsecutiveWithRatio {
            consecutive_failures: 3,
            failure_ratio: 0.6,
        }
    }
}

/// Construction policy shared by every breaker of a registry.
///
/// Defaults: 3 half-open probes, 5 s closed-state reset interval, 10 s open-state
/// cool-down, trip at 3 consecutive failures with a failure ratio of at least 0.6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Probes admitted concurrently while half-open; also the number of
    /// consecutive successes that close the breaker again. Zero means one.
    pub max_requests: u32,
    /// Cyclic period after which a closed breaker clears its counts. Zero disables.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    /// How long the breaker stays open before going half-open.
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    pub trip: TripPolicy,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_requests: 3,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            trip: TripPolicy::default(),
        }
    }
}

impl BreakerSettings {
    /// Create settings with the default policy
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the open-state cool-down
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_trip_policy(mut self, trip: TripPolicy) -> Self {
        self.trip = trip;
        self
    }

    /// Effective half-open budget (`max_requests`, at least 1).
    pub(crate) fn probe_budget(&self) -> u32 {
        self.max_requests.max(1)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|s| s.to_str());
        match extension {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&content),
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::from_yaml_str(&content)
            }
            _ => Err(Error::configuration_with_context(
                "unsupported settings file extension",
                ErrorContext::new()
                    .with_details(path.to_string_lossy().to_string())
                    .with_source("settings_loader"),
            )),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "open-state timeout must be positive",
                ErrorContext::new()
                    .with_field_path("timeout_ms")
                    .with_source("settings_loader"),
            ));
        }
        if let TripPolicy::ConsecutiveWithRatio { failure_ratio, .. } = self.trip {
            if !failure_ratio.is_finite() || !(0.0..=1.0).contains(&failure_ratio) {
                return Err(Error::configuration_with_context(
                    "failure_ratio must be within [0, 1]",
                    ErrorContext::new()
                        .with_field_path("trip.failure_ratio")
                        .with_details(failure_ratio.to_string())
                        .with_source("settings_loader"),
                ));
            }
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
