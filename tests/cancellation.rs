use circuit_guard::telemetry::InMemoryMetricsSink;
use circuit_guard::resilience::TripPolicy;
use circuit_guard::{BreakerSettings, Context, Error, Executor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn executor_with(settings: BreakerSettings) -> (Executor, Arc<InMemoryMetricsSink>) {
    let sink = Arc::new(InMemoryMetricsSink::new());
    let executor = Executor::builder()
        .with_settings(settings)
        .with_metrics_sink(sink.clone())
        .build();
    (executor, sink)
}

fn executor() -> (Executor, Arc<InMemoryMetricsSink>) {
    executor_with(BreakerSettings::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_releases_caller_early() {
    let (executor, sink) = executor();
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let err = executor
        .go(&ctx, "delay", |_| async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok(())
        })
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(err, Error::DeadlineExceeded));
    assert!(waited >= Duration::from_millis(90), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(350), "waited {:?}", waited);
    assert_eq!(sink.count("delay", "context-deadline-exceeded"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_work_still_released() {
    let (executor, _) = executor();
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(50));

    let started = Instant::now();
    let err = executor
        .run(&ctx, "blocking", |_| async {
            // Never yields, so it cannot observe cancellation.
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded));
    assert!(started.elapsed() < Duration::from_millis(250));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_explicit_cancel() {
    let (executor, sink) = executor();
    let (ctx, cancel) = Context::background().with_cancel();

    let fut = executor.go(&ctx, "go cancel", |_| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    });
    cancel.cancel();

    assert!(matches!(fut.await, Err(Error::Cancelled)));
    assert_eq!(sink.count("go cancel", "context-canceled"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_with_fallback() {
    let (executor, sink) = executor();
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(50));

    let result = executor
        .run_with_fallback(
            &ctx,
            "delay and fallback",
            |_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
            |_, err| async move {
                assert!(matches!(err, Error::DeadlineExceeded));
                Ok(())
            },
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(sink.count("delay and fallback", "context-deadline-exceeded"), 1);
    assert_eq!(sink.count("delay and fallback", "fallback-success"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_work_finishing_in_time_wins() {
    let (executor, sink) = executor();
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(500));

    let result = executor
        .run(&ctx, "normal", |_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        })
        .await;

    assert!(result.is_ok());
    // Give the deadline time to pass; the watchdog must not record anything more.
    tokio::time::sleep(Duration::from_millis(550)).await;
    assert_eq!(sink.counters("normal"), vec![("success".to_string(), 1)]);
    assert_eq!(sink.latencies("normal").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_work_keeps_running_and_reports_once() {
    let (executor, sink) = executor();
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(30));
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();

    let err = executor
        .run(&ctx, "abandoned", move |_| async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded));
    assert!(!finished.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(finished.load(Ordering::SeqCst));

    assert_eq!(sink.total("abandoned"), 1);
    assert_eq!(sink.latencies("abandoned").len(), 1);
    let counts = executor.registry().get("abandoned").counts();
    assert_eq!(counts.total_failures, 1);
    assert_eq!(counts.total_successes, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_completion_and_cancel_finalizes_once() {
    // Keep the breaker closed so every call is admitted.
    let settings = BreakerSettings::new().with_trip_policy(TripPolicy::Consecutive {
        failures: u32::MAX,
    });
    let (executor, sink) = executor_with(settings);
    let runs = 200;

    let mut futures = Vec::with_capacity(runs);
    for i in 0..runs {
        let (ctx, cancel) = Context::background().with_cancel();
        let fut = executor.go_with_fallback(
            &ctx,
            "race",
            move |_| async move {
                if i % 2 == 0 {
                    tokio::task::yield_now().await;
                }
                Ok(())
            },
            |_, _| async { Ok(()) },
        );
        cancel.cancel();
        futures.push(fut);
    }
    for fut in futures {
        assert!(fut.await.is_ok());
    }

    let base = sink.count("race", "success") + sink.count("race", "context-canceled");
    assert_eq!(base, runs as u64);
    assert_eq!(
        sink.count("race", "fallback-success"),
        sink.count("race", "context-canceled")
    );
    assert_eq!(sink.latencies("race").len(), runs);
}

#[tokio::test]
async fn test_panic_is_recovered() {
    let (executor, sink) = executor();
    let ctx = Context::background();

    let err = executor
        .run(&ctx, "panic", |_| async {
            if true {
                panic!("panic");
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(err.is_panic());
    assert_eq!(err.to_string(), "command panics: panic");
    assert_eq!(sink.count("panic", "panic"), 1);
    assert_eq!(
        executor.registry().get("panic").counts().total_failures,
        1
    );
}

#[tokio::test]
async fn test_panic_with_fallback() {
    let (executor, sink) = executor();
    let ctx = Context::background();
    let seen_panic = Arc::new(AtomicUsize::new(0));
    let seen = seen_panic.clone();

    let err = executor
        .run_with_fallback(
            &ctx,
            "panic and fallback",
            |_| async {
                let v: Vec<u8> = Vec::new();
                let byte = v[3];
                assert_eq!(byte, 0);
                Ok(())
            },
            move |_, err| async move {
                if err.is_panic() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                Err(Error::command("fallback"))
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "fallback");
    assert_eq!(seen_panic.load(Ordering::SeqCst), 1);
    assert_eq!(sink.count("panic and fallback", "panic"), 1);
    assert_eq!(sink.count("panic and fallback", "fallback-failure"), 1);
}
