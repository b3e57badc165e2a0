//! Criterion benchmarks for the kernel hot loops.
//!
//! Run with: `cargo bench -p divlab-core`
//!
//! - Batch indicator kernels over growing series
//! - Full batch pipeline (`analyze`)
//! - Streaming push of one bar into a warm context

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use divlab_core::divergence::DivergenceConfig;
use divlab_core::domain::Bar;
use divlab_core::indicators::{Indicator, MacdParams};
use divlab_core::{analyze, EngineContext, PipelineParams};

/// Synthetic oscillating bars with drift.
fn generate_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + 10.0 * (t / 15.0).sin() + 3.0 * (t / 4.0).cos() + t * 0.01;
            let open = close - 0.4 * (t / 3.0).sin();
            Bar::new(
                1_700_000_000 + i as i64 * 60,
                open,
                open.max(close) + 0.8,
                open.min(close) - 0.8,
                close,
            )
        })
        .collect()
}

fn params() -> PipelineParams {
    PipelineParams {
        divergence: DivergenceConfig {
            pivot_left: 3,
            pivot_right: 3,
            pivots_to_check: 3,
            ..Default::default()
        },
        indicators: vec![
            Indicator::Sma { period: 20 },
            Indicator::Rsi { period: 14 },
            Indicator::Bbands { period: 20, k: 2.0 },
        ],
        ..Default::default()
    }
}

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators");

    for size in [1_000, 10_000, 100_000].iter() {
        let bars = generate_bars(*size);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        group.bench_with_input(BenchmarkId::new("macd", size), size, |b, _| {
            b.iter(|| divlab_core::indicators::macd(black_box(&closes), MacdParams::default()))
        });
        group.bench_with_input(BenchmarkId::new("rsi_14", size), size, |b, _| {
            b.iter(|| divlab_core::indicators::rsi(black_box(&closes), 14))
        });
        group.bench_with_input(BenchmarkId::new("bbands_20", size), size, |b, _| {
            b.iter(|| divlab_core::indicators::bollinger(black_box(&closes), 20, 2.0))
        });
        group.bench_with_input(BenchmarkId::new("atr_14", size), size, |b, _| {
            b.iter(|| divlab_core::indicators::atr(black_box(&bars), 14))
        });
    }

    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    let params = params();

    for size in [1_000, 10_000].iter() {
        let bars = generate_bars(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| analyze(black_box(&bars), &params))
        });
    }

    group.finish();
}

fn bench_streaming_push(c: &mut Criterion) {
    let bars = generate_bars(10_001);
    let (warm, next) = bars.split_at(10_000);
    let mut ctx = EngineContext::new(params()).unwrap();
    ctx.extend(warm.iter().copied()).unwrap();

    c.bench_function("push_bar_after_10k", |b| {
        b.iter_batched(
            || ctx.clone(),
            |mut ctx| ctx.push_bar(black_box(next[0])),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_indicators, bench_analyze, bench_streaming_push);
criterion_main!(benches);
