//! Stacked RBMs trained by greedy layer-wise pretraining.
//!
//! Layer `i` maps `layer_sizes[i]` visible units to `layer_sizes[i + 1]` hidden
//! units. Layers are trained strictly bottom-up: layer `i` trains on a fixed,
//! materialized snapshot of layer `i - 1`'s hidden probabilities, computed once
//! after layer `i - 1` finishes all of its epochs. There is no joint fine-tuning.
//!
//! ## Propagation asymmetry
//!
//! `up_propagate` passes hidden *probabilities* between layers and is
//! deterministic. `down_propagate` passes *sampled* visible states at every
//! stage, including the final output, so it is stochastic. Reconstruction
//! consumers rely on this exact behavior; it is kept as is.

use ndarray::{Array2, ArrayD};
use std::path::Path;

use crate::checkpoint;
use crate::core::{DbnError, DbnResult, Hyperparams, RbmLayer};
use crate::data::{preprocess, ImageShape};
use crate::training::PretrainReport;
use crate::utils::{self, RandomSource};

/// An ordered stack of [`RbmLayer`]s with adjacent sizes chained.
#[derive(Debug, Clone)]
pub struct StackedModel {
    layer_sizes: Vec<usize>,
    layers: Vec<RbmLayer>,
    image_shape: Option<ImageShape>,
}

impl StackedModel {
    /// Create a stack with default hyperparameters.
    ///
    /// # Errors
    /// - `InvalidConfig` if fewer than two sizes are given or any size is zero
    pub fn new(layer_sizes: Vec<usize>, seed: Option<u64>) -> DbnResult<Self> {
        Self::with_hyperparams(layer_sizes, Hyperparams::default(), seed)
    }

    /// Create a stack whose layers all share `hyperparams`.
    ///
    /// Each layer receives its own random stream forked from one master stream
    /// seeded by `seed`, so a fixed seed reproduces initialization, sampling,
    /// and shuffling.
    ///
    /// # Errors
    /// - `InvalidConfig` if fewer than two sizes are given, any size is zero,
    ///   or the hyperparameters are out of range
    pub fn with_hyperparams(
        layer_sizes: Vec<usize>,
        hyperparams: Hyperparams,
        seed: Option<u64>,
    ) -> DbnResult<Self> {
        if layer_sizes.len() < 2 {
            return Err(DbnError::InvalidConfig(format!(
                "a stack needs at least 2 layer sizes, got {}",
                layer_sizes.len()
            )));
        }

        let mut master: RandomSource = utils::random_source(seed);
        let layers = layer_sizes
            .windows(2)
            .map(|pair| RbmLayer::new(pair[0], pair[1], hyperparams, utils::fork(&mut master)))
            .collect::<DbnResult<Vec<_>>>()?;

        Ok(Self {
            layer_sizes,
            layers,
            image_shape: None,
        })
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[RbmLayer] {
        &self.layers
    }

    /// Image geometry recorded by the last preprocessed batch.
    pub fn image_shape(&self) -> Option<ImageShape> {
        self.image_shape
    }

    pub fn set_image_shape(&mut self, image_shape: Option<ImageShape>) {
        self.image_shape = image_shape;
    }

    /// # Errors
    /// - `LayerIndex` if `index >= n_layers`
    pub fn layer(&self, index: usize) -> DbnResult<&RbmLayer> {
        let n_layers = self.n_layers();
        self.layers
            .get(index)
            .ok_or(DbnError::LayerIndex { index, n_layers })
    }

    /// # Errors
    /// - `LayerIndex` if `index >= n_layers`
    pub fn layer_mut(&mut self, index: usize) -> DbnResult<&mut RbmLayer> {
        let n_layers = self.n_layers();
        self.layers
            .get_mut(index)
            .ok_or(DbnError::LayerIndex { index, n_layers })
    }

    /// Apply one set of hyperparameters to every layer.
    ///
    /// # Errors
    /// - `InvalidConfig` if the values are out of range; no layer is changed
    pub fn set_hyperparams(&mut self, hyperparams: Hyperparams) -> DbnResult<()> {
        hyperparams.validate()?;
        for layer in &mut self.layers {
            layer.set_hyperparams(hyperparams)?;
        }
        Ok(())
    }

    fn flatten_images(&self, images: &ArrayD<f32>) -> DbnResult<(Array2<f32>, ImageShape)> {
        let (data, geometry) = preprocess(images)?;
        if data.ncols() != self.layer_sizes[0] {
            return Err(DbnError::ShapeMismatch(format!(
                "images flatten to {} features, bottom layer has {} visible units",
                data.ncols(),
                self.layer_sizes[0]
            )));
        }
        Ok((data, geometry))
    }

    /// Preprocess an image batch and pretrain every layer on it.
    ///
    /// Records the batch geometry for later reshaping.
    ///
    /// # Errors
    /// - `InvalidConfig` for a bad batch rank, `batch_size == 0`, or `k == 0`
    /// - `ShapeMismatch` if the flattened images do not fit the bottom layer
    pub fn pretrain(
        &mut self,
        images: &ArrayD<f32>,
        epochs_per_layer: usize,
        batch_size: usize,
        k: usize,
    ) -> DbnResult<PretrainReport> {
        let (data, geometry) = self.flatten_images(images)?;
        self.image_shape = Some(geometry);
        self.pretrain_layers(&data, epochs_per_layer, batch_size, k)
    }

    /// Greedy layer-wise pretraining on an already flattened `[0, 1]` matrix.
    ///
    /// # Algorithm
    ///
    /// ```text
    /// inputs = data
    /// for i in 0..n_layers:
    ///     layers[i].fit(inputs, epochs_per_layer, batch_size, k)
    ///     if i is not the last layer:
    ///         inputs = p(h | inputs) under layers[i]     (materialized once)
    /// ```
    ///
    /// # Returns
    /// Per-layer lists of per-epoch reconstruction errors.
    pub fn pretrain_layers(
        &mut self,
        data: &Array2<f32>,
        epochs_per_layer: usize,
        batch_size: usize,
        k: usize,
    ) -> DbnResult<PretrainReport> {
        let last = self.layers.len() - 1;
        let mut report = PretrainReport::default();
        let mut layer_inputs = data.to_owned();

        for (i, layer) in self.layers.iter_mut().enumerate() {
            log::info!(
                "Pretraining layer {i}: {} -> {} units on {} samples",
                layer.n_visible(),
                layer.n_hidden(),
                layer_inputs.nrows()
            );
            let errors = layer.fit_tagged(
                &layer_inputs,
                epochs_per_layer,
                batch_size,
                k,
                &format!("layer {i}"),
            )?;
            report.layer_errors.push(errors);

            if i < last {
                layer_inputs = layer.hidden_probabilities(&layer_inputs)?;
                log::debug!("Layer {i} representation materialized for layer {}", i + 1);
            }
        }

        Ok(report)
    }

    /// Deterministic bottom-up pass through every layer using hidden probabilities.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `data` does not have `layer_sizes[0]` columns
    pub fn up_propagate(&self, data: &Array2<f32>) -> DbnResult<Array2<f32>> {
        let mut activations = data.to_owned();
        for layer in &self.layers {
            activations = layer.hidden_probabilities(&activations)?;
        }
        Ok(activations)
    }

    /// Stochastic top-down pass: sampled visible states at every stage.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `hidden_activations` does not have the top size's columns
    pub fn down_propagate(&mut self, hidden_activations: &Array2<f32>) -> DbnResult<Array2<f32>> {
        let mut activations = hidden_activations.to_owned();
        for layer in self.layers.iter_mut().rev() {
            let (_, states) = layer.sample_visible(&activations)?;
            activations = states;
        }
        Ok(activations)
    }

    /// `down_propagate(up_propagate(data))`.
    pub fn reconstruct(&mut self, data: &Array2<f32>) -> DbnResult<Array2<f32>> {
        let top = self.up_propagate(data)?;
        self.down_propagate(&top)
    }

    /// Preprocess an image batch and return its top-layer representation.
    ///
    /// The min-max scaling is fitted on this batch.
    pub fn extract_features(&self, images: &ArrayD<f32>) -> DbnResult<Array2<f32>> {
        let (data, _) = self.flatten_images(images)?;
        self.up_propagate(&data)
    }

    /// Dream samples: Gibbs-sample the top layer, then propagate down.
    ///
    /// The result has `layer_sizes[0]` columns. Layers below the top contribute
    /// sampled states, as in [`Self::down_propagate`].
    pub fn generate(&mut self, n_samples: usize, gibbs_steps: usize) -> DbnResult<Array2<f32>> {
        let (top, below) = self
            .layers
            .split_last_mut()
            .ok_or_else(|| DbnError::InvalidConfig("empty stack".to_string()))?;

        let mut activations = top.gibbs_sample(n_samples, gibbs_steps)?;
        for layer in below.iter_mut().rev() {
            let (_, states) = layer.sample_visible(&activations)?;
            activations = states;
        }
        Ok(activations)
    }

    /// Write the model to a checkpoint archive.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> DbnResult<()> {
        checkpoint::save_checkpoint(self, path)
    }

    /// Load a model from a checkpoint archive, with default hyperparameters,
    /// zero momentum, and fresh random streams seeded by `seed`.
    ///
    /// # Errors
    /// Returns an error if the archive is unreadable, incomplete, or its arrays
    /// do not match the stored layer sizes.
    pub fn load(path: &Path, seed: Option<u64>) -> DbnResult<Self> {
        checkpoint::load_checkpoint(path, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_init() {
        let model = StackedModel::new(vec![6, 4, 2], Some(0)).unwrap();
        assert_eq!(model.n_layers(), 2);
        assert_eq!(model.layer(0).unwrap().n_visible(), 6);
        assert_eq!(model.layer(0).unwrap().n_hidden(), 4);
        assert_eq!(model.layer(1).unwrap().n_visible(), 4);
        assert_eq!(model.layer(1).unwrap().n_hidden(), 2);
        assert_eq!(model.image_shape(), None);
    }

    #[test]
    fn test_too_few_sizes() {
        assert!(matches!(
            StackedModel::new(vec![5], None),
            Err(DbnError::InvalidConfig(_))
        ));
        assert!(StackedModel::new(vec![], None).is_err());
    }

    #[test]
    fn test_layer_index_out_of_range() {
        let mut model = StackedModel::new(vec![4, 2], Some(0)).unwrap();
        assert!(matches!(
            model.layer(1),
            Err(DbnError::LayerIndex {
                index: 1,
                n_layers: 1
            })
        ));
        assert!(model.layer_mut(7).is_err());
    }

    #[test]
    fn test_seed_reproduces_initialization() {
        let a = StackedModel::new(vec![5, 3, 2], Some(99)).unwrap();
        let b = StackedModel::new(vec![5, 3, 2], Some(99)).unwrap();
        for (la, lb) in a.layers().iter().zip(b.layers()) {
            assert_eq!(la.weights(), lb.weights());
        }
        // Layers draw from distinct streams
        let c = StackedModel::new(vec![4, 4, 4], Some(99)).unwrap();
        assert_ne!(c.layers()[0].weights(), c.layers()[1].weights());
    }

    #[test]
    fn test_propagation_shapes() {
        let mut model = StackedModel::new(vec![6, 4, 3], Some(1)).unwrap();
        let data = Array2::from_elem((5, 6), 0.5);

        let top = model.up_propagate(&data).unwrap();
        assert_eq!(top.dim(), (5, 3));

        let bottom = model.down_propagate(&top).unwrap();
        assert_eq!(bottom.dim(), (5, 6));
        assert!(bottom.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_set_hyperparams_all_layers() {
        let mut model = StackedModel::new(vec![4, 3, 2], Some(1)).unwrap();
        let hp = Hyperparams {
            learning_rate: 0.05,
            momentum: 0.9,
            weight_decay: 0.0,
        };
        model.set_hyperparams(hp).unwrap();
        assert!(model.layers().iter().all(|l| l.hyperparams() == hp));
    }

    #[test]
    fn test_generate_shape() {
        let mut model = StackedModel::new(vec![6, 4, 2], Some(3)).unwrap();
        let samples = model.generate(3, 4).unwrap();
        assert_eq!(samples.dim(), (3, 6));
    }
}
