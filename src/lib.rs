//! # circuit-guard
//!
//! 通过命名熔断器保护不可靠调用，并提供取消、超时、panic 恢复与降级。
//!
//! Guard unreliable operations behind named circuit breakers, with cancellation,
//! timeouts, panic recovery and fallbacks.
//!
//! ## Overview
//!
//! Each call names a breaker. The breaker decides whether the work may run at all;
//! admitted work runs on its own task, raced against the caller's [`Context`]. The
//! first of {work finished, context cancelled, deadline passed} decides the result,
//! which then goes through the optional fallback. Exactly one outcome is reported to
//! the breaker and to the metrics sink per call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use circuit_guard::{Context, Error, Executor};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> circuit_guard::Result<()> {
//!     let executor = Executor::new();
//!     let (ctx, _cancel) = Context::background().with_timeout(Duration::from_secs(1));
//!
//!     executor
//!         .run_with_fallback(
//!             &ctx,
//!             "inventory",
//!             |_ctx| async { Err(Error::command("inventory service unavailable")) },
//!             |_ctx, _err| async { Ok(()) }, // serve cached data instead
//!         )
//!         .await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`executor`] | Guarded execution, command futures and outcome labels |
//! | [`resilience`] | Two-step circuit breaker, registry and settings |
//! | [`telemetry`] | Metrics sinks for outcome counters and latencies |
//! | [`context`] | Cancellation and deadlines |
//!
//! ## Cancellation
//!
//! Cancelling the context releases the caller immediately, but the work itself is
//! never aborted: it keeps running until it returns on its own. Work that never
//! returns keeps its task alive, so bound the duration of your own operations.

pub mod context;
pub mod executor;
pub mod resilience;
pub mod telemetry;

pub use context::{CancelHandle, Cause, Context};
pub use executor::{outcome_label, CommandFuture, Executor, ExecutorBuilder, Outcome};
pub use resilience::{BreakerError, BreakerRegistry, BreakerSettings};
pub use telemetry::MetricsSink;

use once_cell::sync::Lazy;
use std::future::Future;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{BoxError, Error, ErrorContext};

static DEFAULT_EXECUTOR: Lazy<Executor> = Lazy::new(|| {
    let builder = ExecutorBuilder::new();
    match builder.settings_from_env() {
        Ok(builder) => builder.build(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "ignoring invalid breaker settings, using the default policy"
            );
            ExecutorBuilder::new().build()
        }
    }
});

/// Process-wide executor used by the free functions below.
///
/// Breakers use the default policy unless `CIRCUIT_GUARD_SETTINGS` names a settings
/// file; metrics go to the `metrics` facade.
pub fn default_executor() -> &'static Executor {
    &DEFAULT_EXECUTOR
}

/// [`Executor::run`] on the process-wide executor.
pub async fn run<W, Fut>(ctx: &Context, name: &str, work: W) -> Result<()>
where
    W: FnOnce(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    default_executor().run(ctx, name, work).await
}

/// [`Executor::run_with_fallback`] on the process-wide executor.
pub async fn run_with_fallback<W, Fut, F, FFut>(
    ctx: &Context,
    name: &str,
    work: W,
    fallback: F,
) -> Result<()>
where
    W: FnOnce(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    F: FnOnce(Context, Error) -> FFut + Send + 'static,
    FFut: Future<Output = Result<()>> + Send + 'static,
{
    default_executor()
        .run_with_fallback(ctx, name, work, fallback)
        .await
}

/// [`Executor::go`] on the process-wide executor.
pub fn go<W, Fut>(ctx: &Context, name: &str, work: W) -> CommandFuture
where
    W: FnOnce(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    default_executor().go(ctx, name, work)
}

/// [`Executor::go_with_fallback`] on the process-wide executor.
pub fn go_with_fallback<W, Fut, F, FFut>(
    ctx: &Context,
    name: &str,
    work: W,
    fallback: F,
) -> CommandFuture
where
    W: FnOnce(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    F: FnOnce(Context, Error) -> FFut + Send + 'static,
    FFut: Future<Output = Result<()>> + Send + 'static,
{
    default_executor().go_with_fallback(ctx, name, work, fallback)
}
