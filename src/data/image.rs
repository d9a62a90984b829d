//! Image batch preprocessing and geometry.
//!
//! Accepts batches as either
//! ```text
//! [batch, height, width]            (grayscale)
//! [batch, height, width, channels]  (color)
//! ```
//! and flattens each image row-major (HWC, channels interleaved per pixel)
//! into one row of a `[batch, height × width × channels]` matrix.

use ndarray::{Array2, Array3, ArrayD, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::MinMaxScaler;
use crate::checkpoint::ArrayRecord;
use crate::core::{DbnError, DbnResult};

/// Geometry of the images a model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    /// Flattened length (height × width × channels).
    #[must_use]
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reshape one flattened row back into `[height, width, channels]`.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the row length differs from [`Self::len`]
    pub fn unflatten(&self, row: ArrayView1<f32>) -> DbnResult<Array3<f32>> {
        if row.len() != self.len() {
            return Err(DbnError::ShapeMismatch(format!(
                "row of length {} cannot form a {}x{}x{} image",
                row.len(),
                self.height,
                self.width,
                self.channels
            )));
        }
        Array3::from_shape_vec(
            (self.height, self.width, self.channels),
            row.iter().copied().collect(),
        )
        .map_err(|e| DbnError::ShapeMismatch(e.to_string()))
    }
}

/// Flatten an image batch and min-max scale every feature to `[0, 1]`.
///
/// The scaler is fitted on this batch alone.
///
/// # Errors
/// - `InvalidConfig` if the batch rank is not 3 or 4, or an image dimension is zero
pub fn preprocess(images: &ArrayD<f32>) -> DbnResult<(Array2<f32>, ImageShape)> {
    let shape = images.shape();
    let geometry = match *shape {
        [_, height, width] => ImageShape {
            height,
            width,
            channels: 1,
        },
        [_, height, width, channels] => ImageShape {
            height,
            width,
            channels,
        },
        _ => {
            return Err(DbnError::InvalidConfig(format!(
                "image batch must have rank 3 or 4, got rank {}",
                shape.len()
            )))
        }
    };
    if geometry.is_empty() {
        return Err(DbnError::InvalidConfig(format!(
            "image dimensions must be positive, got {geometry:?}"
        )));
    }

    let flat = Array2::from_shape_vec((shape[0], geometry.len()), images.iter().copied().collect())
        .map_err(|e| DbnError::ShapeMismatch(e.to_string()))?;

    Ok((MinMaxScaler::fit_transform(&flat), geometry))
}

/// Decide how `n_units` values can be laid out as a 2D tile.
///
/// Returns `(height, width)` when the count matches the recorded image geometry
/// or is a perfect square, and `None` when only a 1D layout is possible.
#[must_use]
pub fn tile_shape(n_units: usize, geometry: Option<ImageShape>) -> Option<(usize, usize)> {
    if let Some(g) = geometry {
        if n_units == g.len() {
            return Some((g.height, g.width * g.channels));
        }
    }
    // Perfect-square check without floating point round-off
    let side = (1..=n_units).take_while(|s| s * s <= n_units).last()?;
    (side * side == n_units).then_some((side, side))
}

/// Load an image batch stored as one JSON array record (`dtype`, `shape`, `data`).
///
/// # Errors
/// - `Io` / `Serialization` if the file cannot be read or parsed
/// - `ShapeMismatch` if the data length disagrees with the shape
pub fn load_image_batch(path: &Path) -> DbnResult<ArrayD<f32>> {
    let json = std::fs::read_to_string(path)?;
    let record: ArrayRecord = serde_json::from_str(&json)?;
    record.to_arrayd()
}
