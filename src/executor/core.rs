use crate::context::Context;
use crate::resilience::BreakerRegistry;
use crate::telemetry::MetricsSink;
use crate::{Error, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::command::{panic_message, Command, CommandFuture, Fallback};
use super::outcome::Outcome;

/// Runs work behind named circuit breakers.
///
/// Every call goes through the breaker registered under its name. Admitted work runs
/// on its own task, raced against the caller's [`Context`]; whichever finishes first
/// decides the result, and the outcome is reported to the breaker and the metrics
/// sink exactly once.
///
/// Cloning is cheap and clones share the registry and sink.
#[derive(Clone)]
pub struct Executor {
    pub(crate) registry: Arc<BreakerRegistry>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

impl Executor {
    /// Executor with the default breaker policy, reporting to the `metrics` facade.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder for an executor with its own settings, registry or metrics sink.
    pub fn builder() -> super::builder::ExecutorBuilder {
        super::builder::ExecutorBuilder::new()
    }

    /// Registry holding one breaker per command name.
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Sink receiving outcome counters and latencies.
    pub fn metrics_sink(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    /// Run `work` and wait for its outcome.
    pub async fn run<W, Fut>(&self, ctx: &Context, name: &str, work: W) -> Result<()>
    where
        W: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.go(ctx, name, work).await
    }

    /// Run `work` and wait for its outcome; any failure is handed to `fallback`,
    /// whose result replaces it.
    pub async fn run_with_fallback<W, Fut, F, FFut>(
        &self,
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
        self.go_with_fallback(ctx, name, work, fallback).await
    }

    /// Start `work` and return immediately. Must be called within a tokio runtime.
    pub fn go<W, Fut>(&self, ctx: &Context, name: &str, work: W) -> CommandFuture
    where
        W: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.launch(ctx, name, work, None)
    }

    /// Like [`Executor::go`], with a fallback for any failure kind (including
    /// rejection and cancellation).
    pub fn go_with_fallback<W, Fut, F, FFut>(
        &self,
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
        let fallback: Fallback = Box::new(move |ctx, err| fallback(ctx, err).boxed());
        self.launch(ctx, name, work, Some(fallback))
    }

    fn launch<W, Fut>(
        &self,
        ctx: &Context,
        name: &str,
        work: W,
        fallback: Option<Fallback>,
    ) -> CommandFuture
    where
        W: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let breaker = self.registry.get(name);
        let (command, future) = Command::new(name, ctx.clone(), self.metrics.clone(), fallback);
        let command = Arc::new(command);

        let permit = match breaker.allow() {
            Ok(permit) => permit,
            Err(reason) => {
                tokio::spawn(async move {
                    command
                        .resolve(Outcome::Rejected(reason), Err(reason.into()))
                        .await;
                });
                return future;
            }
        };
        command.admit(permit);
        debug!(
            name,
            command_id = %command.id(),
            "command admitted"
        );

        // A context that is already finished never starts the work.
        if let Some(cause) = ctx.cause() {
            tokio::spawn(async move {
                command.resolve(Outcome::from(cause), Err(cause.into())).await;
            });
            return future;
        }

        let (done_tx, done_rx) = oneshot::channel::<()>();

        let worker = Arc::clone(&command);
        let work_ctx = ctx.clone();
        tokio::spawn(async move {
            // `work` is called inside the guarded future so a panic while building
            // the future is caught as well.
            let caught = AssertUnwindSafe(async move { work(work_ctx).await })
                .catch_unwind()
                .await;
            let (outcome, result) = match caught {
                Ok(Ok(())) => (Outcome::Success, Ok(())),
                Ok(Err(err)) => (Outcome::Failed, Err(err)),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        name = worker.name(),
                        command_id = %worker.id(),
                        panic = message.as_str(),
                        "command panicked"
                    );
                    (Outcome::Panicked, Err(Error::panicked(message)))
                }
            };
            worker.resolve(outcome, result).await;
            let _ = done_tx.send(());
        });

        tokio::spawn(async move {
            tokio::select! {
                _ = done_rx => {}
                cause = command.ctx().done() => {
                    command.resolve(Outcome::from(cause), Err(cause.into())).await;
                }
            }
        });

        future
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
