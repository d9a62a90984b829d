//! Single bipartite layer of stochastic binary units.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

use super::{DbnError, DbnResult, Hyperparams};
use crate::training::shuffled_batches;
use crate::utils::{self, RandomSource};

/// Standard deviation of the zero-mean normal used for weight initialization.
pub const WEIGHT_INIT_STD: f32 = 0.01;

/// A Restricted Boltzmann Machine with binary visible and hidden units.
///
/// # Parameters
///
/// - **Weights:** shape `(n_visible, n_hidden)`, drawn from `N(0, 0.01)`
/// - **Biases:** `visible_bias` (length `n_visible`) and `hidden_bias`
///   (length `n_hidden`), both zero at construction
/// - **Momentum buffers:** one per parameter, same shape, zero at construction.
///   They persist across minibatches and epochs and are never reallocated.
///
/// The layer owns its random stream, so a seeded layer is fully reproducible.
#[derive(Clone)]
pub struct RbmLayer {
    n_visible: usize,
    n_hidden: usize,
    weights: Array2<f32>,
    visible_bias: Array1<f32>,
    hidden_bias: Array1<f32>,
    weight_update: Array2<f32>,
    visible_bias_update: Array1<f32>,
    hidden_bias_update: Array1<f32>,
    hyperparams: Hyperparams,
    rng: RandomSource,
}

impl std::fmt::Debug for RbmLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbmLayer")
            .field("n_visible", &self.n_visible)
            .field("n_hidden", &self.n_hidden)
            .field("hyperparams", &self.hyperparams)
            .finish_non_exhaustive()
    }
}

fn check_columns(x: &Array2<f32>, expected: usize, what: &str) -> DbnResult<()> {
    if x.ncols() == expected {
        Ok(())
    } else {
        Err(DbnError::ShapeMismatch(format!(
            "{what} has {} columns, layer expects {expected}",
            x.ncols()
        )))
    }
}

impl RbmLayer {
    /// Create a layer with normally initialized weights and zero biases.
    ///
    /// # Errors
    /// - `InvalidConfig` if either size is zero or the hyperparameters are out of range
    pub fn new(
        n_visible: usize,
        n_hidden: usize,
        hyperparams: Hyperparams,
        mut rng: RandomSource,
    ) -> DbnResult<Self> {
        if n_visible == 0 || n_hidden == 0 {
            return Err(DbnError::InvalidConfig(format!(
                "layer sizes must be positive, got {n_visible}x{n_hidden}"
            )));
        }
        hyperparams.validate()?;

        let dist = Normal::new(0.0f32, WEIGHT_INIT_STD)
            .map_err(|e| DbnError::InvalidConfig(format!("weight distribution: {e}")))?;
        let weights = Array2::random_using((n_visible, n_hidden), dist, &mut rng);

        Ok(Self {
            n_visible,
            n_hidden,
            weights,
            visible_bias: Array1::zeros(n_visible),
            hidden_bias: Array1::zeros(n_hidden),
            weight_update: Array2::zeros((n_visible, n_hidden)),
            visible_bias_update: Array1::zeros(n_visible),
            hidden_bias_update: Array1::zeros(n_hidden),
            hyperparams,
            rng,
        })
    }

    pub fn n_visible(&self) -> usize {
        self.n_visible
    }

    pub fn n_hidden(&self) -> usize {
        self.n_hidden
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn visible_bias(&self) -> &Array1<f32> {
        &self.visible_bias
    }

    pub fn hidden_bias(&self) -> &Array1<f32> {
        &self.hidden_bias
    }

    /// Momentum accumulator for the weights.
    pub fn weight_update(&self) -> &Array2<f32> {
        &self.weight_update
    }

    pub fn visible_bias_update(&self) -> &Array1<f32> {
        &self.visible_bias_update
    }

    pub fn hidden_bias_update(&self) -> &Array1<f32> {
        &self.hidden_bias_update
    }

    pub fn hyperparams(&self) -> Hyperparams {
        self.hyperparams
    }

    /// Replace the hyperparameters. Momentum buffers are left untouched.
    ///
    /// # Errors
    /// - `InvalidConfig` if the new values are out of range
    pub fn set_hyperparams(&mut self, hyperparams: Hyperparams) -> DbnResult<()> {
        hyperparams.validate()?;
        self.hyperparams = hyperparams;
        Ok(())
    }

    /// Overwrite weights and biases in place, keeping every shape fixed.
    ///
    /// # Errors
    /// - `ShapeMismatch` if any array disagrees with the layer's dimensions
    pub fn set_parameters(
        &mut self,
        weights: Array2<f32>,
        visible_bias: Array1<f32>,
        hidden_bias: Array1<f32>,
    ) -> DbnResult<()> {
        if weights.dim() != (self.n_visible, self.n_hidden) {
            return Err(DbnError::ShapeMismatch(format!(
                "weights are {:?}, layer expects {:?}",
                weights.dim(),
                (self.n_visible, self.n_hidden)
            )));
        }
        if visible_bias.len() != self.n_visible {
            return Err(DbnError::ShapeMismatch(format!(
                "visible bias has length {}, layer expects {}",
                visible_bias.len(),
                self.n_visible
            )));
        }
        if hidden_bias.len() != self.n_hidden {
            return Err(DbnError::ShapeMismatch(format!(
                "hidden bias has length {}, layer expects {}",
                hidden_bias.len(),
                self.n_hidden
            )));
        }
        self.weights.assign(&weights);
        self.visible_bias.assign(&visible_bias);
        self.hidden_bias.assign(&hidden_bias);
        Ok(())
    }

    /// `P(h = 1 | v) = σ(v W + b)` for every row of `visible`.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `visible` does not have `n_visible` columns
    pub fn hidden_probabilities(&self, visible: &Array2<f32>) -> DbnResult<Array2<f32>> {
        check_columns(visible, self.n_visible, "visible input")?;
        let activation = visible.dot(&self.weights) + &self.hidden_bias;
        Ok(activation.mapv(utils::sigmoid))
    }

    /// `P(v = 1 | h) = σ(h Wᵀ + a)` for every row of `hidden`.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `hidden` does not have `n_hidden` columns
    pub fn visible_probabilities(&self, hidden: &Array2<f32>) -> DbnResult<Array2<f32>> {
        check_columns(hidden, self.n_hidden, "hidden input")?;
        let activation = hidden.dot(&self.weights.t()) + &self.visible_bias;
        Ok(activation.mapv(utils::sigmoid))
    }

    /// Sample the hidden layer given visible activity.
    ///
    /// Returns `(hidden_probs, hidden_states)`. The probabilities depend only on
    /// the parameters and the input; the states draw one uniform per entry from
    /// the layer's stream.
    pub fn sample_hidden(
        &mut self,
        visible: &Array2<f32>,
    ) -> DbnResult<(Array2<f32>, Array2<f32>)> {
        let probs = self.hidden_probabilities(visible)?;
        let states = utils::bernoulli(&probs, &mut self.rng);
        Ok((probs, states))
    }

    /// Sample the visible layer given hidden activity. Shape dual of [`Self::sample_hidden`].
    pub fn sample_visible(
        &mut self,
        hidden: &Array2<f32>,
    ) -> DbnResult<(Array2<f32>, Array2<f32>)> {
        let probs = self.visible_probabilities(hidden)?;
        let states = utils::bernoulli(&probs, &mut self.rng);
        Ok((probs, states))
    }

    /// Perform one CD-k parameter update on a minibatch.
    ///
    /// # Algorithm
    ///
    /// ```text
    /// positive:  p(h|v₀), h₀ ~ p(h|v₀)
    /// negative:  k times: vₜ ~ p(v|hₜ₋₁), hₜ ~ p(h|vₜ)
    ///            keep p(v|·), p(h|·) of the last step
    /// ΔW  ∝ (v₀ᵀ p(h|v₀) - p(v)ᵀ p(h)) / B - λ W
    /// Δa  ∝ mean(v₀ - p(v))
    /// Δb  ∝ mean(p(h|v₀) - p(h))
    /// update = momentum · update + learning_rate · gradient;  θ += update
    /// ```
    ///
    /// Gradient ascent on the approximate log-likelihood. Exactly one update is
    /// applied per call.
    ///
    /// # Returns
    /// The positive-phase hidden probabilities.
    ///
    /// # Errors
    /// - `InvalidConfig` if `k == 0`
    /// - `ShapeMismatch` if the batch has no rows or not `n_visible` columns
    #[allow(clippy::cast_precision_loss)]
    pub fn contrastive_divergence(
        &mut self,
        visible_data: &Array2<f32>,
        k: usize,
    ) -> DbnResult<Array2<f32>> {
        if k == 0 {
            return Err(DbnError::InvalidConfig(
                "contrastive divergence needs at least one Gibbs step".to_string(),
            ));
        }
        if visible_data.nrows() == 0 {
            return Err(DbnError::ShapeMismatch("empty minibatch".to_string()));
        }

        // Positive phase
        let (pos_hidden_probs, pos_hidden_states) = self.sample_hidden(visible_data)?;
        let positive_associations = visible_data.t().dot(&pos_hidden_probs);

        // Negative phase: k Gibbs alternations from the sampled hidden states
        let mut hidden_states = pos_hidden_states;
        let mut visible_probs = Array2::zeros(visible_data.dim());
        let mut hidden_probs = Array2::zeros(pos_hidden_probs.dim());
        for _ in 0..k {
            let (v_probs, v_states) = self.sample_visible(&hidden_states)?;
            let (h_probs, h_states) = self.sample_hidden(&v_states)?;
            visible_probs = v_probs;
            hidden_probs = h_probs;
            hidden_states = h_states;
        }
        let negative_associations = visible_probs.t().dot(&hidden_probs);

        let batch_size = visible_data.nrows() as f32;
        let mut weight_gradient = (positive_associations - negative_associations) / batch_size;
        weight_gradient.scaled_add(-self.hyperparams.weight_decay, &self.weights);

        let visible_bias_gradient = (visible_data - &visible_probs)
            .mean_axis(Axis(0))
            .ok_or_else(|| DbnError::ShapeMismatch("empty minibatch".to_string()))?;
        let hidden_bias_gradient = (&pos_hidden_probs - &hidden_probs)
            .mean_axis(Axis(0))
            .ok_or_else(|| DbnError::ShapeMismatch("empty minibatch".to_string()))?;

        let Hyperparams {
            learning_rate,
            momentum,
            ..
        } = self.hyperparams;

        self.weight_update *= momentum;
        self.weight_update.scaled_add(learning_rate, &weight_gradient);
        self.weights += &self.weight_update;

        self.visible_bias_update *= momentum;
        self.visible_bias_update.scaled_add(learning_rate, &visible_bias_gradient);
        self.visible_bias += &self.visible_bias_update;

        self.hidden_bias_update *= momentum;
        self.hidden_bias_update.scaled_add(learning_rate, &hidden_bias_gradient);
        self.hidden_bias += &self.hidden_bias_update;

        Ok(pos_hidden_probs)
    }

    /// Deterministic up-then-down pass using probabilities at both steps.
    pub fn reconstruct(&self, visible_data: &Array2<f32>) -> DbnResult<Array2<f32>> {
        let hidden_probs = self.hidden_probabilities(visible_data)?;
        self.visible_probabilities(&hidden_probs)
    }

    /// Mean squared error between `visible_data` and its reconstruction.
    ///
    /// A progress diagnostic only; CD does not minimize it directly.
    pub fn reconstruction_error(&self, visible_data: &Array2<f32>) -> DbnResult<f32> {
        let reconstruction = self.reconstruct(visible_data)?;
        Ok(utils::mean_squared_error(visible_data, &reconstruction))
    }

    /// Train for exactly `epochs` passes over `data`.
    ///
    /// Each epoch draws a fresh permutation, cuts it into `n_samples / batch_size`
    /// full minibatches (the remainder is dropped), applies one CD-k update per
    /// minibatch and measures that minibatch's reconstruction error with the
    /// just-updated parameters. An epoch's error is the mean over its minibatches.
    ///
    /// An epoch with no complete minibatch performs no update and contributes no
    /// entry to the returned list.
    ///
    /// # Errors
    /// - `InvalidConfig` if `batch_size == 0` or `k == 0`
    /// - `ShapeMismatch` if `data` does not have `n_visible` columns
    pub fn fit(
        &mut self,
        data: &Array2<f32>,
        epochs: usize,
        batch_size: usize,
        k: usize,
    ) -> DbnResult<Vec<f32>> {
        self.fit_tagged(data, epochs, batch_size, k, "rbm")
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn fit_tagged(
        &mut self,
        data: &Array2<f32>,
        epochs: usize,
        batch_size: usize,
        k: usize,
        tag: &str,
    ) -> DbnResult<Vec<f32>> {
        if batch_size == 0 {
            return Err(DbnError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if k == 0 {
            return Err(DbnError::InvalidConfig(
                "contrastive divergence needs at least one Gibbs step".to_string(),
            ));
        }
        check_columns(data, self.n_visible, "training data")?;

        let mut epoch_errors = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let batches = shuffled_batches(data.nrows(), batch_size, &mut self.rng);
            if batches.is_empty() {
                log::warn!(
                    "{tag}: epoch {}/{epochs} skipped, {} samples < batch size {batch_size}",
                    epoch + 1,
                    data.nrows()
                );
                continue;
            }

            let mut total_error = 0.0f32;
            for indices in &batches {
                let batch = data.select(Axis(0), indices);
                self.contrastive_divergence(&batch, k)?;
                total_error += self.reconstruction_error(&batch)?;
            }
            let mean_error = total_error / batches.len() as f32;

            log::info!(
                "{tag}: epoch {}/{epochs} reconstruction_error={mean_error:.6}",
                epoch + 1
            );
            epoch_errors.push(mean_error);
        }

        Ok(epoch_errors)
    }

    /// Free energy `F(v) = -v·a - Σ_j softplus(b_j + v·W_j)` for every row.
    pub fn free_energy(&self, visible: &Array2<f32>) -> DbnResult<Array1<f32>> {
        check_columns(visible, self.n_visible, "visible input")?;
        let visible_term = visible.dot(&self.visible_bias);
        let hidden_input = visible.dot(&self.weights) + &self.hidden_bias;
        let hidden_term = hidden_input
            .mapv(utils::softplus)
            .sum_axis(Axis(1));
        Ok(-(visible_term + hidden_term))
    }

    /// Run `steps` Gibbs alternations from a uniformly random binary visible batch.
    ///
    /// Returns the visible probabilities of the final step (or the random
    /// starting states when `steps == 0`).
    pub fn gibbs_sample(&mut self, n_samples: usize, steps: usize) -> DbnResult<Array2<f32>> {
        let start = Array2::from_elem((n_samples, self.n_visible), 0.5f32);
        let mut visible = utils::bernoulli(&start, &mut self.rng);
        let mut visible_probs = visible.clone();
        for _ in 0..steps {
            let (_, hidden_states) = self.sample_hidden(&visible)?;
            let (probs, states) = self.sample_visible(&hidden_states)?;
            visible_probs = probs;
            visible = states;
        }
        Ok(visible_probs)
    }
}
