//! Per-invocation state and the exactly-once finalization gate.

use crate::context::Context;
use crate::resilience::circuit_breaker::BreakerPermit;
use crate::telemetry::MetricsSink;
use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context as TaskContext, Poll};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::outcome::Outcome;

/// Boxed fallback, called with the failure it may replace.
pub(crate) type Fallback = Box<dyn FnOnce(Context, Error) -> BoxFuture<'static, Result<()>> + Send>;

/// State consumed by the single finalization.
struct Pending {
    permit: Option<BreakerPermit>,
    fallback: Option<Fallback>,
    slot: oneshot::Sender<Result<()>>,
}

pub(crate) struct Command {
    id: Uuid,
    name: String,
    ctx: Context,
    started_at: Instant,
    metrics: Arc<dyn MetricsSink>,
    fired: AtomicBool,
    pending: Mutex<Option<Pending>>,
}

impl Command {
    pub(crate) fn new(
        name: &str,
        ctx: Context,
        metrics: Arc<dyn MetricsSink>,
        fallback: Option<Fallback>,
    ) -> (Command, CommandFuture) {
        let (slot, rx) = oneshot::channel();
        let command = Command {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ctx,
            started_at: Instant::now(),
            metrics,
            fired: AtomicBool::new(false),
            pending: Mutex::new(Some(Pending {
                permit: None,
                fallback,
                slot,
            })),
        };
        (command, CommandFuture { rx })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ctx(&self) -> &Context {
        &self.ctx
    }

    /// Attach the admission permit; reported by whichever path finalizes.
    pub(crate) fn admit(&self, permit: BreakerPermit) {
        if let Some(pending) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            pending.permit = Some(permit);
        }
    }

    /// Finalize with `outcome`. Only the first caller gets through; later calls are
    /// discarded and return `false`.
    pub(crate) async fn resolve(&self, outcome: Outcome, result: Result<()>) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(
                name = self.name.as_str(),
                command_id = %self.id,
                outcome = outcome.label(),
                "command already finalized, discarding late outcome"
            );
            return false;
        }

        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Pending {
            permit,
            fallback,
            slot,
        }) = pending
        else {
            return false;
        };

        if let Some(permit) = permit {
            permit.report(outcome.is_success());
        }
        self.metrics.increment(&self.name, outcome.label());
        self.log_outcome(outcome, &result);

        let visible = match (result, fallback) {
            (Err(err), Some(fallback)) => self.run_fallback(fallback, err).await,
            (result, _) => result,
        };

        // Admission to finalization, never the other way round.
        let elapsed = self.started_at.elapsed();
        self.metrics.observe_latency(&self.name, elapsed);
        debug!(
            name = self.name.as_str(),
            command_id = %self.id,
            outcome = outcome.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "command finalized"
        );

        if slot.send(visible).is_err() {
            debug!(
                name = self.name.as_str(),
                command_id = %self.id,
                "caller dropped the command future before it resolved"
            );
        }
        true
    }

    async fn run_fallback(&self, fallback: Fallback, err: Error) -> Result<()> {
        let ctx = self.ctx.clone();
        let result = match AssertUnwindSafe(async move { fallback(ctx, err).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    name = self.name.as_str(),
                    command_id = %self.id,
                    panic = message.as_str(),
                    "fallback panicked"
                );
                Err(Error::panicked(message))
            }
        };

        let fallback_outcome = if result.is_ok() {
            Outcome::FallbackSucceeded
        } else {
            Outcome::FallbackFailed
        };
        self.metrics.increment(&self.name, fallback_outcome.label());
        result
    }

    fn log_outcome(&self, outcome: Outcome, result: &Result<()>) {
        if outcome.is_success() {
            return;
        }
        let name = self.name.as_str();
        match (outcome, result) {
            (Outcome::Rejected(reason), _) => warn!(
                name,
                command_id = %self.id,
                category = outcome.category(),
                outcome = outcome.label(),
                reason = %reason,
                "command rejected by circuit breaker"
            ),
            (Outcome::Cancelled | Outcome::TimedOut, _) => warn!(
                name,
                command_id = %self.id,
                category = outcome.category(),
                outcome = outcome.label(),
                "command released before the work finished"
            ),
            (_, Err(err)) => warn!(
                name,
                command_id = %self.id,
                category = outcome.category(),
                outcome = outcome.label(),
                error = %err,
                "command failed"
            ),
            (_, Ok(())) => {}
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Resolves to the command's visible result once it is finalized.
///
/// Dropping it does not cancel the command; the outcome is still reported to the
/// breaker and the metrics sink.
#[must_use = "a command future does nothing for the caller unless awaited"]
#[derive(Debug)]
pub struct CommandFuture {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for CommandFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::runtime_with_context(
                "command dropped before it was finalized",
                ErrorContext::new().with_source("executor"),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
