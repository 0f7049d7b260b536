use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

use super::config::BreakerSettings;

/// Why a breaker refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BreakerError {
    #[error("circuit breaker is open")]
    Open,
    /// Half-open and every probe slot is taken.
    #[error("too many requests")]
    TooManyRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::HalfOpen => "half-open",
            State::Open => "open",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request and outcome counts of the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: State,
    pub generation: u64,
    pub counts: Counts,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug)]
struct Machine {
    state: State,
    generation: u64,
    counts: Counts,
    /// Closed: next count reset. Open: end of cool-down. Half-open: none.
    expiry: Option<Instant>,
}

/// Two-step circuit breaker.
///
/// Admission and outcome are separate calls: [`CircuitBreaker::allow`] hands out a
/// [`BreakerPermit`], and the permit is later consumed by [`BreakerPermit::report`].
/// Reports that arrive after the breaker moved to a new generation are ignored.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    machine: Mutex<Machine>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let now = Instant::now();
        let expiry = Self::closed_expiry(&settings, now);
        Self {
            name: name.into(),
            settings,
            machine: Mutex::new(Machine {
                state: State::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Ask for admission. On success the caller must report the outcome through the
    /// returned permit.
    pub fn allow(self: &Arc<Self>) -> Result<BreakerPermit, BreakerError> {
        let mut m = self.lock();
        let now = Instant::now();
        self.refresh(&mut m, now);

        match m.state {
            State::Open => return Err(BreakerError::Open),
            State::HalfOpen if m.counts.requests >= self.settings.probe_budget() => {
                return Err(BreakerError::TooManyRequests)
            }
            _ => {}
        }

        m.counts.on_request();
        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            generation: m.generation,
        })
    }

    pub fn state(&self) -> State {
        let mut m = self.lock();
        self.refresh(&mut m, Instant::now());
        m.state
    }

    pub fn counts(&self) -> Counts {
        let mut m = self.lock();
        self.refresh(&mut m, Instant::now());
        m.counts
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let mut m = self.lock();
        let now = Instant::now();
        self.refresh(&mut m, now);
        let open_remaining_ms = match (m.state, m.expiry) {
            (State::Open, Some(until)) if until > now => Some((until - now).as_millis() as u64),
            _ => None,
        };
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: m.state,
            generation: m.generation,
            counts: m.counts,
            open_remaining_ms,
        }
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut m = self.lock();
        let now = Instant::now();
        self.refresh(&mut m, now);
        if m.generation != generation {
            return;
        }

        match (m.state, success) {
            (State::Closed, true) => m.counts.on_success(),
            (State::Closed, false) => {
                m.counts.on_failure();
                if self.settings.trip.ready_to_trip(&m.counts) {
                    self.set_state(&mut m, State::Open, now);
                }
            }
            (State::HalfOpen, true) => {
                m.counts.on_success();
                if m.counts.consecutive_successes >= self.settings.probe_budget() {
                    self.set_state(&mut m, State::Closed, now);
                }
            }
            (State::HalfOpen, false) => self.set_state(&mut m, State::Open, now),
            // An open breaker never admits, so only stale permits could land here and
            // those were filtered out by the generation check.
            (State::Open, _) => {}
        }
    }

    /// Apply time-driven transitions.
    fn refresh(&self, m: &mut Machine, now: Instant) {
        match (m.state, m.expiry) {
            (State::Closed, Some(expiry)) if expiry <= now => self.new_generation(m, now),
            (State::Open, Some(expiry)) if expiry <= now => {
                self.set_state(m, State::HalfOpen, now)
            }
            _ => {}
        }
    }

    fn set_state(&self, m: &mut Machine, state: State, now: Instant) {
        if m.state == state {
            return;
        }
        let from = m.state;
        m.state = state;
        self.new_generation(m, now);
        info!(
            breaker = self.name.as_str(),
            from = from.as_str(),
            to = state.as_str(),
            "circuit breaker state changed"
        );
    }

    fn new_generation(&self, m: &mut Machine, now: Instant) {
        m.generation = m.generation.wrapping_add(1);
        m.counts = Counts::default();
        m.expiry = match m.state {
            State::Closed => Self::closed_expiry(&self.settings, now),
            State::Open => Some(now + self.settings.timeout),
            State::HalfOpen => None,
        };
    }

    fn closed_expiry(settings: &BreakerSettings, now: Instant) -> Option<Instant> {
        if settings.interval == Duration::ZERO {
            None
        } else {
            Some(now + settings.interval)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Machine> {
        // The machine is updated in place without intermediate invalid states, so a
        // poisoned lock still guards consistent data.
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// One admitted attempt. Consumed by [`BreakerPermit::report`].
#[must_use = "an admitted attempt must report its outcome"]
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
}

impl BreakerPermit {
    pub fn report(self, success: bool) {
        self.breaker.after_request(self.generation, success);
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}
