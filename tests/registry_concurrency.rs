use circuit_guard::telemetry::InMemoryMetricsSink;
use circuit_guard::{BreakerRegistry, BreakerSettings, Context, Error, Executor};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_get_sees_one_breaker() {
    let registry = Arc::new(BreakerRegistry::new());
    let barrier = Arc::new(tokio::sync::Barrier::new(32));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                registry.get("x")
            })
        })
        .collect();

    let mut breakers = Vec::new();
    for h in handles {
        breakers.push(h.await.unwrap());
    }
    assert!(breakers.iter().all(|b| Arc::ptr_eq(b, &breakers[0])));
    assert_eq!(registry.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commands_share_statistics() {
    let sink = Arc::new(InMemoryMetricsSink::new());
    let executor = Executor::builder()
        .with_settings(BreakerSettings::default())
        .with_metrics_sink(sink.clone())
        .build();
    let ctx = Context::background();

    let futures: Vec<_> = (0..50)
        .map(|_| executor.go(&ctx, "shared", |_| async { Ok(()) }))
        .collect();
    for fut in futures {
        assert!(fut.await.is_ok());
    }

    let counts = executor.registry().get("shared").counts();
    assert_eq!(counts.requests, 50);
    assert_eq!(counts.total_successes, 50);
    assert_eq!(sink.count("shared", "success"), 50);
    assert_eq!(executor.registry().names(), vec!["shared".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_executors_sharing_a_registry_share_breakers() {
    let registry = Arc::new(BreakerRegistry::new());
    let a = Executor::builder().with_registry(registry.clone()).build();
    let b = Executor::builder().with_registry(registry.clone()).build();
    let ctx = Context::background();

    for _ in 0..3 {
        let _ = a
            .run(&ctx, "dependency", |_| async { Err(Error::command("down")) })
            .await;
    }
    let err = b
        .run(&ctx, "dependency", |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert!(err.is_rejection());
}
