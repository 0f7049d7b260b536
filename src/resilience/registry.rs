//! Breaker registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use super::config::BreakerSettings;

/// Lazily creates one breaker per name and hands out the same instance forever.
///
/// Every breaker is built from the registry's settings template; callers cannot
/// influence construction. Entries are never removed.
pub struct BreakerRegistry {
    settings: BreakerSettings,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::with_settings(BreakerSettings::default())
    }

    pub fn with_settings(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Breaker for `name`, created on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cb) = breakers.get(name) {
                return Arc::clone(cb);
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have inserted it between the read and write locks.
        if let Some(cb) = breakers.get(name) {
            return Arc::clone(cb);
        }
        let cb = Arc::new(CircuitBreaker::new(name, self.settings.clone()));
        breakers.insert(name.to_string(), Arc::clone(&cb));
        debug!(breaker = name, "circuit breaker created");
        cb
    }

    pub fn contains(&self, name: &str) -> bool {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Snapshot of an existing breaker. Does not create one.
    pub fn snapshot(&self, name: &str) -> Option<CircuitBreakerSnapshot> {
        let cb = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()?;
        Some(cb.snapshot())
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("settings", &self.settings)
            .field("breakers", &self.names())
            .finish()
    }
}
