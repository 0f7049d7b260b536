//! Benchmarks for guarded command execution
//!
//! This benchmark measures:
//! - Breaker admission and reporting without any task spawning
//! - End-to-end `run` overhead for successful and rejected work
//! - Registry lookup across many breaker names

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use circuit_guard::resilience::BreakerRegistry;
use circuit_guard::telemetry::NoopMetricsSink;
use circuit_guard::{BreakerSettings, Context, Error, Executor};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn quiet_executor() -> Executor {
    Executor::builder()
        .with_metrics_sink(Arc::new(NoopMetricsSink))
        .build()
}

fn bench_breaker_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("breaker_admission");
    let registry = BreakerRegistry::new();
    let breaker = registry.get("bench");

    group.bench_function("allow_and_report", |b| {
        b.iter(|| {
            let permit = breaker.allow().unwrap();
            permit.report(black_box(true));
        })
    });

    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("run");
    let ctx = Context::background();

    let executor = quiet_executor();
    group.bench_function("success", |b| {
        b.to_async(&rt)
            .iter(|| executor.run(&ctx, "success", |_| async { Ok(()) }))
    });

    // Trip the breaker once, then measure the short-circuit path.
    let tripped = Executor::builder()
        .with_settings(BreakerSettings::new().with_timeout(Duration::from_secs(3600)))
        .with_metrics_sink(Arc::new(NoopMetricsSink))
        .build();
    rt.block_on(async {
        for _ in 0..3 {
            let _ = tripped
                .run(&ctx, "open", |_| async { Err(Error::command("down")) })
                .await;
        }
    });
    group.bench_function("rejected", |b| {
        b.to_async(&rt)
            .iter(|| tripped.run(&ctx, "open", |_| async { Ok(()) }))
    });

    let (deadline_ctx, _cancel) = Context::background().with_timeout(Duration::from_secs(3600));
    group.bench_function("success_with_deadline", |b| {
        b.to_async(&rt)
            .iter(|| executor.run(&deadline_ctx, "deadline", |_| async { Ok(()) }))
    });

    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");

    for size in [1usize, 64, 1024] {
        let registry = BreakerRegistry::new();
        let names: Vec<String> = (0..size).map(|i| format!("dependency-{i}")).collect();
        for name in &names {
            registry.get(name);
        }

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &names, |b, names| {
            b.iter(|| {
                for name in names {
                    black_box(registry.get(name));
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_breaker_admission,
    bench_run,
    bench_registry_lookup
);
criterion_main!(benches);
