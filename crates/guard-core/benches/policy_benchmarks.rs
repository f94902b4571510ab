//! Benchmarks for the admission and replay hot paths.
//!
//! Run with: `cargo bench -p request-guard-core`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use request_guard_core::{GuardConfig, RateLimitOptions, RequestPolicy};
use serde_json::json;
use std::hint::black_box;

fn bench_check_rate_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_rate_limit");

    for clients in [1usize, 1_000, 10_000] {
        let policy = RequestPolicy::new(GuardConfig::default());
        let options = RateLimitOptions::new(60_000, u32::MAX);
        let ids: Vec<String> = (0..clients).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(clients), &ids, |b, ids| {
            let mut i = 0usize;
            b.iter(|| {
                let id = &ids[i % ids.len()];
                i = i.wrapping_add(1);
                black_box(policy.check_rate_limit("bench:scope", id, options))
            })
        });
    }

    group.finish();
}

fn bench_replay_lookup(c: &mut Criterion) {
    let policy = RequestPolicy::new(GuardConfig::default());
    for i in 0..1_000 {
        policy.cache_api_response("bench", &format!("key-{}", i), 200, json!({"n": i}));
    }

    c.bench_function("get_replay_hit", |b| {
        b.iter(|| black_box(policy.get_replay("bench", "key-500")))
    });
    c.bench_function("get_replay_miss", |b| {
        b.iter(|| black_box(policy.get_replay("bench", "missing")))
    });
}

criterion_group!(benches, bench_check_rate_limit, bench_replay_lookup);
criterion_main!(benches);
