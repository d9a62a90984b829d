//! Core RBM algorithm implementation.
//!
//! This module provides the single-layer engine and the types shared by the
//! rest of the crate:
//! - Stochastic binary units with sigmoid conditionals
//! - Contrastive Divergence (CD-k) gradient estimation
//! - Momentum and weight-decay parameter updates
//!
//! ## Energy
//!
//! A restricted Boltzmann machine assigns energy to a joint configuration
//! of visible units `v` and hidden units `h`:
//! ```text
//! E(v, h) = -v·a - h·b - vᵀ W h
//! ```
//!
//! Both conditionals factorize, so `P(h_j = 1 | v) = σ(b_j + v·W_j)` and
//! `P(v_i = 1 | h) = σ(a_i + W_i·h)`.
//!
//! Extreme weights saturate the sigmoid and freeze sampling at 0 or 1. This is
//! an expected limitation of unconstrained CD training and is not guarded.

pub mod rbm;

pub use rbm::RbmLayer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for DBN operations.
#[derive(Error, Debug)]
pub enum DbnError {
    /// Invalid model or training configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Per-layer accessor called with an index outside `[0, n_layers)`
    #[error("Layer index {index} out of range for a stack of {n_layers} layers")]
    LayerIndex { index: usize, n_layers: usize },

    /// Matrix shapes disagree (inputs or persisted arrays)
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A named array required by the archive format is absent
    #[error("Missing array in archive: {0}")]
    MissingArray(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type DbnResult<T> = Result<T, DbnError>;

/// Per-layer learning hyperparameters, fixed for the lifetime of a layer
/// unless explicitly replaced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparams {
    /// Step size applied to each gradient, must be > 0
    pub learning_rate: f32,
    /// Fraction of the previous update carried forward, in `[0, 1)`
    pub momentum: f32,
    /// L2 shrinkage subtracted from the weight gradient, >= 0
    pub weight_decay: f32,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            momentum: 0.5,
            weight_decay: 0.0001,
        }
    }
}

impl Hyperparams {
    /// Check the ranges required by the update rule.
    ///
    /// # Errors
    /// - `InvalidConfig` if any value is out of range or not finite
    pub fn validate(&self) -> DbnResult<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DbnError::InvalidConfig(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(DbnError::InvalidConfig(format!(
                "momentum must lie in [0, 1), got {}",
                self.momentum
            )));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(DbnError::InvalidConfig(format!(
                "weight_decay must be a non-negative finite number, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}
