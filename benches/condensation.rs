//! Benchmarks for the per-turn hot paths

use context_condenser::compress::{CompressionLevel, CompressorConfig, SemanticCompressor};
use context_condenser::conversation::{resolve_trigger, truncate, Message};
use context_condenser::tokens::{CachedTokenCounter, HeuristicCounter, TokenCountingCache};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn counter() -> CachedTokenCounter {
    CachedTokenCounter::new(
        Arc::new(TokenCountingCache::new(Duration::from_secs(60), 10_000)),
        Arc::new(HeuristicCounter::default()),
        "bench-model",
    )
}

fn bench_resolve_trigger(c: &mut Criterion) {
    let thresholds = HashMap::new();
    let overrides = HashMap::new();

    c.bench_function("resolve_trigger", |b| {
        b.iter(|| {
            resolve_trigger(
                black_box(200_000),
                black_box(Some(8192)),
                75.0,
                &thresholds,
                &overrides,
                None,
            )
        })
    });
}

fn bench_truncate(c: &mut Criterion) {
    let messages: Vec<Message> = (0..200)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("question {} about the failing build", i))
            } else {
                Message::assistant(format!("answer {} with a proposed fix", i))
            }
        })
        .collect();

    c.bench_function("truncate_200_messages", |b| {
        b.iter(|| truncate(black_box(messages.clone()), 0.5, "bench"))
    });
}

fn bench_compress(c: &mut Criterion) {
    let compressor = SemanticCompressor::new(CompressorConfig::default(), counter());
    let paragraph = "The deploy failed because the config loader basically could not find \
        the file. We should actually check the search path in `load_config` first. \
        See https://ci.example.com/run/42 for the full log. The retry loop in \
        src/worker/runner.rs masks the original error. I think that is really the bug. \
        Fix the path handling and the rest just works. "
        .repeat(20);

    c.bench_function("compress_light", |b| {
        b.iter(|| {
            compressor.clear_cache();
            compressor.compress(black_box(paragraph.as_str()), CompressionLevel::Light)
        })
    });

    c.bench_function("compress_aggressive", |b| {
        b.iter(|| {
            compressor.clear_cache();
            compressor.compress(black_box(paragraph.as_str()), CompressionLevel::Aggressive)
        })
    });
}

criterion_group!(
    benches,
    bench_resolve_trigger,
    bench_truncate,
    bench_compress
);
criterion_main!(benches);
