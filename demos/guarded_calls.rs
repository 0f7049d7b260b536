//! Guarded calls walkthrough
//!
//! Runs a handful of commands against a flaky dependency and prints what each one
//! resolved to:
//! - a plain success and a plain failure
//! - a failure rescued by a fallback
//! - the breaker tripping and short-circuiting later calls
//! - an asynchronous call released early by its deadline
//!
//! Usage:
//!   RUST_LOG=circuit_guard=debug cargo run --example guarded_calls

use circuit_guard::telemetry::{CompositeMetricsSink, InMemoryMetricsSink, RecorderMetricsSink};
use circuit_guard::{outcome_label, BreakerSettings, Context, Error, Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    RecorderMetricsSink::describe();
    let memory = Arc::new(InMemoryMetricsSink::new());
    let sink = CompositeMetricsSink::new()
        .add_sink(memory.clone())
        .add_sink(Arc::new(RecorderMetricsSink::new()));

    let settings = BreakerSettings::new().with_timeout(Duration::from_millis(500));
    let executor = Executor::builder()
        .with_settings(settings)
        .with_metrics_sink(Arc::new(sink))
        .build();
    let ctx = Context::background();

    let result = executor.run(&ctx, "inventory", |_| async { Ok(()) }).await;
    println!("1. healthy call         -> {}", outcome_label(&result));

    let result = executor
        .run(&ctx, "inventory", |_| async {
            Err(Error::command("inventory service unavailable"))
        })
        .await;
    println!("2. failing call         -> {:?}", result.err().map(|e| e.to_string()));

    let result = executor
        .run_with_fallback(
            &ctx,
            "inventory",
            |_| async { Err(Error::command("inventory service unavailable")) },
            |_, err| async move {
                println!("   fallback saw: {err}");
                Ok(())
            },
        )
        .await;
    println!("3. rescued by fallback  -> {}", outcome_label(&result));

    let _ = executor
        .run(&ctx, "inventory", |_| async { Err(Error::command("still down")) })
        .await;
    let breaker = executor.registry().get("inventory");
    println!("4. breaker is now       -> {}", breaker.state());

    let result = executor
        .run(&ctx, "inventory", |_| async {
            println!("   this never prints");
            Ok(())
        })
        .await;
    println!("   short-circuited      -> {}", outcome_label(&result));

    let (deadline_ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(100));
    let started = tokio::time::Instant::now();
    let pending = executor.go(&deadline_ctx, "report", |_| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    });
    let result = pending.await;
    println!(
        "5. slow async call      -> {} after {:?}",
        outcome_label(&result),
        started.elapsed()
    );

    println!("\nrecorded outcomes:");
    for name in executor.registry().names() {
        for (label, count) in memory.counters(&name) {
            println!("  {name:<10} {label:<28} {count}");
        }
    }
    println!(
        "\nsnapshot: {}",
        serde_json::to_string_pretty(&breaker.snapshot())?
    );

    Ok(())
}
