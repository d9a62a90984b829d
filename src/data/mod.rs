//! Dataset preprocessing: image flattening and per-feature scaling.
//!
//! ## Submodules
//!
//! - [`image`]: image batch geometry, flattening, and reshape helpers

pub mod image;

pub use image::{preprocess, tile_shape, ImageShape};

use ndarray::{Array1, Array2, Axis};

/// Per-feature min-max scaler fitted on one batch.
///
/// Maps each column to `[0, 1]` via `(x - min) / (max - min)`. Columns that are
/// constant over the fitted batch map to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    pub min: Array1<f32>,
    pub max: Array1<f32>,
}

impl MinMaxScaler {
    /// Record per-column minima and maxima.
    #[must_use]
    pub fn fit(data: &Array2<f32>) -> Self {
        let min = data.fold_axis(Axis(0), f32::INFINITY, |&a, &b| a.min(b));
        let max = data.fold_axis(Axis(0), f32::NEG_INFINITY, |&a, &b| a.max(b));
        Self { min, max }
    }

    /// Scale `data` with the fitted ranges.
    #[must_use]
    pub fn transform(&self, data: &Array2<f32>) -> Array2<f32> {
        let mut scaled = data.clone();
        for mut row in scaled.rows_mut() {
            for ((v, &lo), &hi) in row.iter_mut().zip(self.min.iter()).zip(self.max.iter()) {
                let range = hi - lo;
                *v = if range > 0.0 { (*v - lo) / range } else { 0.0 };
            }
        }
        scaled
    }

    /// Fit on `data` and scale it in one step.
    #[must_use]
    pub fn fit_transform(data: &Array2<f32>) -> Array2<f32> {
        Self::fit(data).transform(data)
    }
}
