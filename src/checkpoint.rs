//! Checkpoint save/load for stacked models.
//!
//! A checkpoint is one JSON archive of named dense arrays:
//! ```text
//! layer_sizes, image_height, image_width, channels      (int64)
//! layer_{i}_weights, layer_{i}_visible_bias, layer_{i}_hidden_bias   (float32)
//! ```
//! Hyperparameters and momentum buffers are not stored; a loaded model starts
//! with default hyperparameters and zero momentum.

use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::{DbnError, DbnResult, Hyperparams};
use crate::data::ImageShape;
use crate::stack::StackedModel;

/// One named dense array with its element type, shape, and row-major data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", rename_all = "lowercase")]
pub enum ArrayRecord {
    Int64 { shape: Vec<usize>, data: Vec<i64> },
    Float32 { shape: Vec<usize>, data: Vec<f32> },
}

impl ArrayRecord {
    /// Record a float array of any dimensionality.
    pub fn from_array<D: ndarray::Dimension>(array: &ndarray::Array<f32, D>) -> Self {
        Self::Float32 {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    /// Record a 1D integer sequence.
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_ints(values: &[usize]) -> Self {
        Self::Int64 {
            shape: vec![values.len()],
            data: values.iter().map(|&v| v as i64).collect(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Int64 { shape, .. } | Self::Float32 { shape, .. } => shape,
        }
    }

    /// Materialize as a float array, converting integers.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the data length disagrees with the shape
    #[allow(clippy::cast_precision_loss)]
    pub fn to_arrayd(&self) -> DbnResult<ArrayD<f32>> {
        let (shape, data): (&[usize], Vec<f32>) = match self {
            Self::Int64 { shape, data } => {
                (shape.as_slice(), data.iter().map(|&v| v as f32).collect())
            }
            Self::Float32 { shape, data } => (shape.as_slice(), data.clone()),
        };
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| DbnError::ShapeMismatch(format!("array record {shape:?}: {e}")))
    }

    /// Read back a 1D integer sequence.
    ///
    /// # Errors
    /// - `ShapeMismatch` for float records, non-1D records, or negative values
    pub fn to_ints(&self) -> DbnResult<Vec<usize>> {
        match self {
            Self::Int64 { shape, data } if shape.len() == 1 && shape[0] == data.len() => data
                .iter()
                .map(|&v| {
                    usize::try_from(v).map_err(|_| {
                        DbnError::ShapeMismatch(format!("negative integer {v} in archive"))
                    })
                })
                .collect(),
            other => Err(DbnError::ShapeMismatch(format!(
                "expected a 1D int64 array, found shape {:?}",
                other.shape()
            ))),
        }
    }
}

/// Collection of named arrays, serialized as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub arrays: BTreeMap<String, ArrayRecord>,
}

impl Archive {
    pub fn insert(&mut self, name: impl Into<String>, record: ArrayRecord) {
        self.arrays.insert(name.into(), record);
    }

    /// Look up a named array.
    ///
    /// # Errors
    /// - `MissingArray` if no array has that name
    pub fn get(&self, name: &str) -> DbnResult<&ArrayRecord> {
        self.arrays
            .get(name)
            .ok_or_else(|| DbnError::MissingArray(name.to_string()))
    }

    fn scalar(&self, name: &str) -> DbnResult<usize> {
        match self.get(name)?.to_ints()?.as_slice() {
            [value] => Ok(*value),
            other => Err(DbnError::ShapeMismatch(format!(
                "{name} should hold one integer, found {}",
                other.len()
            ))),
        }
    }

    fn array1(&self, name: &str) -> DbnResult<Array1<f32>> {
        self.get(name)?
            .to_arrayd()?
            .into_dimensionality::<Ix1>()
            .map_err(|e| DbnError::ShapeMismatch(format!("{name}: {e}")))
    }

    fn array2(&self, name: &str) -> DbnResult<Array2<f32>> {
        self.get(name)?
            .to_arrayd()?
            .into_dimensionality::<Ix2>()
            .map_err(|e| DbnError::ShapeMismatch(format!("{name}: {e}")))
    }

    /// Write the archive as JSON, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> DbnResult<()> {
        let json = serde_json::to_string(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read an archive written by [`Archive::save`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> DbnResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn weights_key(i: usize) -> String {
    format!("layer_{i}_weights")
}

fn visible_bias_key(i: usize) -> String {
    format!("layer_{i}_visible_bias")
}

fn hidden_bias_key(i: usize) -> String {
    format!("layer_{i}_hidden_bias")
}

/// Capture a model's sizes, image geometry, and per-layer parameters.
pub fn model_to_archive(model: &StackedModel) -> Archive {
    let mut archive = Archive::default();
    archive.insert("layer_sizes", ArrayRecord::from_ints(model.layer_sizes()));

    let geometry = model.image_shape().unwrap_or(ImageShape {
        height: 0,
        width: 0,
        channels: 0,
    });
    archive.insert("image_height", ArrayRecord::from_ints(&[geometry.height]));
    archive.insert("image_width", ArrayRecord::from_ints(&[geometry.width]));
    archive.insert("channels", ArrayRecord::from_ints(&[geometry.channels]));

    for (i, layer) in model.layers().iter().enumerate() {
        archive.insert(weights_key(i), ArrayRecord::from_array(layer.weights()));
        archive.insert(
            visible_bias_key(i),
            ArrayRecord::from_array(layer.visible_bias()),
        );
        archive.insert(
            hidden_bias_key(i),
            ArrayRecord::from_array(layer.hidden_bias()),
        );
    }
    archive
}

/// Rebuild a model from an archive.
///
/// Layers are constructed from `layer_sizes` first; every stored array must
/// then match its layer's shape exactly.
///
/// # Errors
/// - `MissingArray` if a required array is absent
/// - `ShapeMismatch` if a stored array disagrees with the constructed layer
/// - `InvalidConfig` if `layer_sizes` is not a valid stack
pub fn model_from_archive(archive: &Archive, seed: Option<u64>) -> DbnResult<StackedModel> {
    let layer_sizes = archive.get("layer_sizes")?.to_ints()?;
    let mut model = StackedModel::with_hyperparams(layer_sizes, Hyperparams::default(), seed)?;

    let geometry = ImageShape {
        height: archive.scalar("image_height")?,
        width: archive.scalar("image_width")?,
        channels: archive.scalar("channels")?,
    };
    model.set_image_shape((!geometry.is_empty()).then_some(geometry));

    for i in 0..model.n_layers() {
        let weights = archive.array2(&weights_key(i))?;
        let visible_bias = archive.array1(&visible_bias_key(i))?;
        let hidden_bias = archive.array1(&hidden_bias_key(i))?;
        model
            .layer_mut(i)?
            .set_parameters(weights, visible_bias, hidden_bias)
            .map_err(|e| match e {
                DbnError::ShapeMismatch(msg) => {
                    DbnError::ShapeMismatch(format!("layer {i}: {msg}"))
                }
                other => other,
            })?;
    }
    Ok(model)
}

/// Save a model checkpoint to a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be written or the data cannot be serialized.
pub fn save_checkpoint(model: &StackedModel, path: &Path) -> DbnResult<()> {
    model_to_archive(model).save(path)
}

/// Load a model checkpoint from a JSON file.
///
/// `seed` drives the fresh random streams of the reloaded layers.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the stored arrays
/// do not fit the stored layer sizes.
pub fn load_checkpoint(path: &Path, seed: Option<u64>) -> DbnResult<StackedModel> {
    model_from_archive(&Archive::load(path)?, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_test_model() -> StackedModel {
        StackedModel::new(vec![8, 4, 2], Some(17)).expect("valid sizes")
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut model = make_test_model();
        model.set_image_shape(Some(ImageShape {
            height: 2,
            width: 4,
            channels: 1,
        }));
        let dir = std::env::temp_dir().join("dbn_test_checkpoint");
        let path = dir.join("model.json");

        let result = save_checkpoint(&model, &path);
        assert!(result.is_ok(), "Failed to save: {:?}", result.err());

        let loaded = load_checkpoint(&path, Some(1)).expect("Failed to load");
        assert_eq!(loaded.layer_sizes(), model.layer_sizes());
        assert_eq!(loaded.image_shape(), model.image_shape());

        for (original, restored) in model.layers().iter().zip(loaded.layers()) {
            assert_eq!(original.weights().dim(), restored.weights().dim());
            for (a, b) in original.weights().iter().zip(restored.weights().iter()) {
                assert!((a - b).abs() < 1e-6, "Weight mismatch: {a} vs {b}");
            }
            for (a, b) in original.hidden_bias().iter().zip(restored.hidden_bias().iter()) {
                assert!((a - b).abs() < 1e-6, "Bias mismatch: {a} vs {b}");
            }
            assert_eq!(original.visible_bias().len(), restored.visible_bias().len());
            assert!(restored.weight_update().iter().all(|&u| u == 0.0));
            assert_eq!(restored.hyperparams(), Hyperparams::default());
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_geometry_round_trips_as_none() {
        let model = make_test_model();
        let restored = model_from_archive(&model_to_archive(&model), None).unwrap();
        assert_eq!(restored.image_shape(), None);
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let model = make_test_model();
        let mut archive = model_to_archive(&model);
        archive.insert(
            "layer_1_weights",
            ArrayRecord::from_array(&Array2::<f32>::zeros((3, 2))),
        );
        let result = model_from_archive(&archive, None);
        assert!(matches!(result, Err(DbnError::ShapeMismatch(_))));
    }

    #[test]
    fn test_missing_array() {
        let model = make_test_model();
        let mut archive = model_to_archive(&model);
        archive.arrays.remove("layer_0_hidden_bias");
        let result = model_from_archive(&archive, None);
        assert!(
            matches!(result, Err(DbnError::MissingArray(name)) if name == "layer_0_hidden_bias")
        );
    }

    #[test]
    fn test_float_record_rejected_as_ints() {
        let record = ArrayRecord::from_array(&Array1::<f32>::zeros(3));
        assert!(record.to_ints().is_err());
    }

    #[test]
    fn test_load_nonexistent_checkpoint() {
        let result = load_checkpoint(Path::new("/nonexistent/model.json"), None);
        assert!(matches!(result, Err(DbnError::Io(_))));
    }
}
