//! Resilience benchmarks
//!
//! Benchmarks for circuit breaker admission and outcome recording on the
//! synchronous and asynchronous paths, state-machine transitions, registry
//! lookups, and backoff calculations.
//!
//! Run with: `cargo bench --bench resilience_bench -p breakwater-common
//! --features runtime`

use std::sync::Arc;
use std::time::Duration;

use breakwater_common::resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    ConstantBackoff, ExponentialBackoff, Jitter, LinearBackoff, MockClock, ResilienceError,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn tripping_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .request_volume_threshold(5)
        .error_threshold_percentage(50)
        .sleep_window(Duration::from_secs(60))
        .build()
        .expect("valid circuit breaker config for benchmarks")
}

fn bench_circuit_breaker_sync_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_sync_paths");

    group.bench_function("call_success", |b| {
        let breaker = CircuitBreaker::new("bench-success", CircuitBreakerConfig::default())
            .expect("circuit breaker should build with defaults");
        b.iter(|| {
            let result: Result<_, ResilienceError<std::io::Error>> =
                breaker.call(|| Ok::<_, std::io::Error>(()));
            if let Err(err) = result {
                panic!("circuit breaker success path failed: {err}");
            }
        });
    });

    group.bench_function("call_fail_to_open", |b| {
        b.iter(|| {
            let breaker = CircuitBreaker::new("bench-trip", tripping_config())
                .expect("circuit breaker should build with benchmark configuration");

            for _ in 0..5 {
                let result: Result<_, ResilienceError<std::io::Error>> =
                    breaker.call(|| Err::<(), _>(std::io::Error::other("benchmark failure")));
                let _result = black_box(result);
            }

            black_box(breaker.state());
        });
    });

    group.bench_function("open_short_circuit", |b| {
        let config = CircuitBreakerConfig::builder()
            .request_volume_threshold(1)
            .sleep_window(Duration::from_secs(600))
            .build()
            .expect("valid circuit breaker config for benchmarks");
        let breaker = CircuitBreaker::new("bench-open", config)
            .expect("circuit breaker should build for short-circuit");

        // Trip the breaker so it remains open for the benchmark iterations.
        let _ = breaker.call(|| Err::<(), _>(std::io::Error::other("initial failure")));

        b.iter(|| {
            let result: Result<_, ResilienceError<std::io::Error>> =
                breaker.call(|| Ok::<_, std::io::Error>(()));
            let _result = black_box(result);
        });
    });

    group.bench_function("stats_snapshot", |b| {
        let breaker = CircuitBreaker::new("bench-stats", CircuitBreakerConfig::default())
            .expect("circuit breaker should build with defaults");
        for _ in 0..100 {
            let _ = breaker.call(|| Ok::<_, std::io::Error>(()));
        }
        b.iter(|| black_box(breaker.stats()));
    });

    group.finish();
}

fn bench_circuit_breaker_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_state_machine");

    group.bench_function("open_half_open_recover", |b| {
        b.iter(|| {
            let clock = MockClock::new();
            let breaker =
                CircuitBreaker::with_clock("bench-cycle", tripping_config(), clock.clone())
                    .expect("circuit breaker should build with mock clock");

            for _ in 0..5 {
                let _ = breaker.call(|| Err::<(), _>(std::io::Error::other("state transition")));
            }
            black_box(breaker.state());

            clock.advance(Duration::from_secs(60));
            let _ = breaker.call(|| Ok::<_, std::io::Error>(()));

            black_box(breaker.state());
        });
    });

    group.finish();
}

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn bench_circuit_breaker_async(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_async");
    let runtime = build_runtime();
    let breaker = Arc::new(
        CircuitBreaker::new("bench-async", CircuitBreakerConfig::default())
            .expect("circuit breaker should build with defaults"),
    );

    group.bench_function("execute_success", |b| {
        b.to_async(&runtime).iter(|| {
            let breaker = Arc::clone(&breaker);
            async move {
                let result = breaker.execute(|| async { Ok::<_, std::io::Error>(()) }).await;
                if let Err(err) = result {
                    panic!("async success path failed: {err}");
                }
            }
        });
    });

    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("breaker_registry");
    let registry = CircuitBreakerRegistry::new();
    let config = CircuitBreakerConfig::default();
    for index in 0..32 {
        let _ = registry.get_or_create(&format!("command-{index}"), &config);
    }

    group.bench_function("get_or_create_existing", |b| {
        b.iter(|| black_box(registry.get_or_create("command-17", &config)));
    });

    group.finish();
}

// ============================================================================
// Backoff Benchmarks
// ============================================================================

fn bench_backoff_calculations(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff_calculations");
    let attempts = [0u32, 1, 5, 10];

    let strategies: [(&str, Box<dyn BackoffStrategy>); 4] = [
        ("constant", Box::new(ConstantBackoff::new(Duration::from_millis(1)))),
        (
            "linear",
            Box::new(LinearBackoff::new(
                Duration::from_millis(1),
                Duration::from_millis(5),
                Duration::from_secs(1),
            )),
        ),
        (
            "exponential",
            Box::new(ExponentialBackoff::new(
                Duration::from_millis(1),
                2.0,
                Duration::from_secs(1),
            )),
        ),
        (
            "exponential_full_jitter",
            Box::new(
                ExponentialBackoff::new(Duration::from_millis(1), 2.0, Duration::from_secs(1))
                    .with_jitter(Jitter::Full),
            ),
        ),
    ];

    for (name, strategy) in &strategies {
        group.bench_with_input(BenchmarkId::new("next_interval", name), strategy, |b, strat| {
            b.iter(|| {
                for attempt in attempts {
                    black_box(strat.next_interval(attempt));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    resilience,
    bench_circuit_breaker_sync_paths,
    bench_circuit_breaker_state_machine,
    bench_circuit_breaker_async,
    bench_registry_lookup,
    bench_backoff_calculations
);
criterion_main!(resilience);
