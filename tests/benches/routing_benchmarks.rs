//! # Relay Bus Routing Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Matcher | best match across a growing pattern set |
//! | Router | sync round trip through one handler |
//! | Correlator | track, complete and claim one result |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::Rng;
use shared_bus::{
    handler_fn, BusConfig, Correlator, MatchMode, MessageBus, MessageBusApi, Outcome, Pattern,
    PatternMatcher, Payload, TransId, Wait,
};
use std::time::Duration;

// ============================================================================
// FIXTURES
// ============================================================================

const WORDS: [&str; 8] = ["db", "users", "orders", "cache", "auth", "api", "v1", "v2"];

fn random_name(rng: &mut impl Rng, depth: usize) -> String {
    let mut name = String::new();
    for _ in 0..depth {
        name.push('/');
        name.push_str(WORDS.choose(rng).copied().unwrap_or("x"));
    }
    name
}

fn random_patterns(rng: &mut impl Rng, count: usize) -> Vec<Pattern> {
    (0..count)
        .map(|_| {
            let depth = rng.gen_range(1..=4);
            let mut raw = random_name(&mut *rng, depth);
            if rng.gen_bool(0.5) {
                raw.push_str("/*");
            }
            Pattern::parse(raw).unwrap()
        })
        .collect()
}

// ============================================================================
// MATCHER
// ============================================================================

fn bench_best_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern-matcher");
    let mut rng = rand::thread_rng();
    let names: Vec<String> = (0..256).map(|_| random_name(&mut rng, 4)).collect();

    for mode in [MatchMode::Glob, MatchMode::Segment] {
        let matcher = PatternMatcher::new(mode);
        for count in [16, 128, 1024] {
            let patterns = random_patterns(&mut rng, count);
            group.throughput(Throughput::Elements(names.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), count),
                &patterns,
                |b, patterns| {
                    b.iter(|| {
                        for name in &names {
                            black_box(matcher.best(name, patterns.iter()));
                        }
                    })
                },
            );
        }
    }
    group.finish();
}

// ============================================================================
// ROUTER + CORRELATOR
// ============================================================================

fn bench_sync_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let bus = MessageBus::new(BusConfig::default()).unwrap();
    bus.register(
        "/echo",
        handler_fn(|request| async move { Ok(Outcome::Reply(request.payload().clone())) }),
    )
    .unwrap();

    c.bench_function("router/sync_round_trip", |b| {
        b.iter(|| {
            runtime
                .block_on(bus.send_sync("/echo", Payload::from_static(b"ping")))
                .unwrap()
        })
    });
}

fn bench_correlate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let correlator = Correlator::new(None);

    c.bench_function("correlator/track_complete_claim", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let id = TransId::new();
                correlator
                    .track(id, tokio::time::Instant::now() + Duration::from_secs(5))
                    .unwrap();
                correlator.complete(id, Ok(Payload::from_static(b"pong")));
                black_box(correlator.await_result(id, Wait::Poll).await.unwrap())
            })
        })
    });
}

criterion_group!(
    benches,
    bench_best_match,
    bench_sync_round_trip,
    bench_correlate
);
criterion_main!(benches);
