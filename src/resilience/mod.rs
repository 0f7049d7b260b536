//! 弹性模块：熔断器、熔断器注册表与配置。
//!
//! # Resilience Primitives Module
//!
//! Named circuit breakers and the registry that owns them.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Two-step circuit breaker (admission, then report) |
//! | [`registry`] | Lazily created, per-name breakers shared by all callers |
//! | [`config`] | Breaker construction policy and its YAML/JSON loaders |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: attempts pass through; counts reset every `interval`
//! - **Open**: the trip policy fired, attempts fail fast until `timeout` elapses
//! - **Half-Open**: up to `max_requests` probes; that many successes close it again,
//!   any failure reopens it
//!
//! ```rust
//! use circuit_guard::resilience::{BreakerRegistry, BreakerSettings};
//!
//! let registry = BreakerRegistry::with_settings(BreakerSettings::default());
//! let breaker = registry.get("payments");
//!
//! match breaker.allow() {
//!     Ok(permit) => {
//!         // Make the call...
//!         permit.report(true);
//!     }
//!     Err(rejected) => println!("skipped: {rejected}"),
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod registry;

pub use circuit_breaker::{
    BreakerError, BreakerPermit, CircuitBreaker, CircuitBreakerSnapshot, Counts, State,
};
pub use config::{BreakerSettings, TripPolicy};
pub use registry::BreakerRegistry;
