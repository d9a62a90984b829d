//! Criterion benchmarks for RBM training and stack inference.
//!
//! Run with: `cargo bench --bench dbn_bench`
//!
//! ## Benchmarks
//!
//! 1. **CD step**: one contrastive divergence update per batch size
//! 2. **Fit epoch**: a full shuffled epoch on one layer
//! 3. **Greedy pretraining**: every layer of a small stack
//! 4. **Up-propagation**: deterministic inference through the stack

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbn::{random_source, Hyperparams, RbmLayer, StackedModel};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Uniform `[0, 1)` data, reproducible per seed.
fn synthetic_dataset(num_samples: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = random_source(Some(seed));
    Array2::random_using((num_samples, dim), Uniform::new(0.0f32, 1.0), &mut rng)
}

fn bench_layer(n_visible: usize, n_hidden: usize) -> RbmLayer {
    RbmLayer::new(
        n_visible,
        n_hidden,
        Hyperparams::default(),
        random_source(Some(0)),
    )
    .expect("Failed to create benchmark layer")
}

// ============================================================================
// Benchmark: Contrastive Divergence Step
// ============================================================================

fn bench_cd_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cd_step");

    for batch_size in [10, 50, 100] {
        let data = synthetic_dataset(batch_size, 784, 1);
        group.bench_with_input(
            BenchmarkId::new("cd1_784x256", batch_size),
            &data,
            |b, data| {
                let mut layer = bench_layer(784, 256);
                b.iter(|| {
                    layer
                        .contrastive_divergence(black_box(data), 1)
                        .expect("cd step failed")
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmark: One Training Epoch
// ============================================================================

fn bench_fit_epoch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_epoch");
    group.sample_size(10);

    let data = synthetic_dataset(500, 64, 2);
    for k in [1, 5] {
        group.bench_with_input(BenchmarkId::new("epoch_500x64_cd", k), &k, |b, &k| {
            let mut layer = bench_layer(64, 32);
            b.iter(|| layer.fit(black_box(&data), 1, 20, k).expect("fit failed"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Greedy Pretraining
// ============================================================================

fn bench_pretrain(c: &mut Criterion) {
    let mut group = c.benchmark_group("pretrain");
    group.sample_size(10);

    let data = synthetic_dataset(200, 64, 3);
    group.bench_function("stack_64_32_16", |b| {
        b.iter(|| {
            let mut model =
                StackedModel::new(vec![64, 32, 16], Some(4)).expect("Failed to create model");
            model
                .pretrain_layers(black_box(&data), 1, 20, 1)
                .expect("pretrain failed")
        });
    });

    group.finish();
}

// ============================================================================
// Benchmark: Up-Propagation
// ============================================================================

fn bench_up_propagate(c: &mut Criterion) {
    let model =
        StackedModel::new(vec![784, 500, 250, 30], Some(5)).expect("Failed to create model");
    let data = synthetic_dataset(100, 784, 6);

    c.bench_function("up_propagate_784_500_250_30", |b| {
        b.iter(|| model.up_propagate(black_box(&data)).expect("up failed"));
    });
}

criterion_group!(
    benches,
    bench_cd_step,
    bench_fit_epoch,
    bench_pretrain,
    bench_up_propagate
);
criterion_main!(benches);
