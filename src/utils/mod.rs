//! Math utilities, stochastic sampling, and the random stream type.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seedable pseudo-random stream used for initialization, sampling, and shuffling.
pub type RandomSource = StdRng;

/// Build a random stream: deterministic when a seed is given, entropy-seeded otherwise.
#[must_use]
pub fn random_source(seed: Option<u64>) -> RandomSource {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Derive an independent child stream from a parent stream.
pub fn fork(parent: &mut RandomSource) -> RandomSource {
    StdRng::seed_from_u64(parent.gen())
}

/// Logistic sigmoid: 1 / (1 + e^-x).
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softplus: ln(1 + e^x).
#[inline]
pub fn softplus(x: f32) -> f32 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Draw binary states: each entry is 1 with probability `probs[i, j]`, else 0.
///
/// One uniform draw per entry, in row-major order.
pub fn bernoulli(probs: &Array2<f32>, rng: &mut RandomSource) -> Array2<f32> {
    probs.mapv(|p| if rng.gen::<f32>() < p { 1.0 } else { 0.0 })
}

/// Mean squared error over every entry of two equally shaped matrices.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_squared_error(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    let diff = a - b;
    diff.iter().map(|v| v * v).sum::<f32>() / diff.len() as f32
}

/// Fisher-Yates permutation of `0..n`.
pub fn permutation(n: usize, rng: &mut RandomSource) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in (1..indices.len()).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }
    indices
}
