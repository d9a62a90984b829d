//! # DBN (Deep Belief Networks)
//!
//! Stacks of Restricted Boltzmann Machines trained by greedy layer-wise
//! Contrastive Divergence.
//!
//! ## Overview
//!
//! Each layer is an energy-based model over binary visible and hidden units.
//! Layers learn **independently**: layer `i` trains with CD-k on the hidden
//! probabilities that the already-trained layer `i - 1` induces on the data.
//! No gradient flows through the stack.
//!
//! ## Structure
//!
//! - [`core`]: Single-layer RBM engine, error type, hyperparameters
//! - [`stack`]: Stacked model: greedy pretraining, propagation, persistence
//! - [`training`]: Minibatch scheduling and training reports
//! - [`data`]: Image batch preprocessing and geometry
//! - [`checkpoint`]: Named-array archive format
//! - [`utils`]: Sigmoid, sampling, random streams

pub mod checkpoint;
pub mod core;
pub mod data;
pub mod stack;
pub mod training;
pub mod utils;

pub use core::{DbnError, DbnResult, Hyperparams, RbmLayer};
pub use data::{preprocess, ImageShape};
pub use stack::StackedModel;
pub use training::{EpochRecord, PretrainReport};
pub use utils::{random_source, RandomSource};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Training configuration for greedy pretraining.
///
/// Loadable from TOML; absent keys keep their defaults:
/// ```toml
/// epochs = 20
/// batch_size = 64
/// cd_steps = 1
/// seed = 7
///
/// [hyperparams]
/// learning_rate = 0.1
/// momentum = 0.5
/// weight_decay = 0.0001
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Epochs per layer
    pub epochs: usize,
    pub batch_size: usize,
    /// Gibbs steps `k` in CD-k
    pub cd_steps: usize,
    pub hyperparams: Hyperparams,
    /// Seed for the model's random streams; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 10,
            cd_steps: 1,
            hyperparams: Hyperparams::default(),
            seed: None,
        }
    }
}

impl Config {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// - `ConfigParse` on malformed TOML
    /// - `InvalidConfig` if the values cannot drive training
    pub fn from_toml_str(toml_str: &str) -> DbnResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> DbnResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// # Errors
    /// - `InvalidConfig` if `batch_size` or `cd_steps` is zero
    /// - `InvalidConfig` if the hyperparameters are out of range
    pub fn validate(&self) -> DbnResult<()> {
        if self.batch_size == 0 {
            return Err(DbnError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.cd_steps == 0 {
            return Err(DbnError::InvalidConfig("cd_steps must be at least 1".into()));
        }
        self.hyperparams.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_toml() {
        let config = Config::from_toml_str(
            r#"
            epochs = 3
            batch_size = 5
            seed = 11

            [hyperparams]
            momentum = 0.9
            "#,
        )
        .unwrap();

        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.cd_steps, 1);
        assert_eq!(config.seed, Some(11));
        assert!((config.hyperparams.momentum - 0.9).abs() < 1e-6);
        assert!((config.hyperparams.learning_rate - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_config_rejects_zero_cd_steps() {
        let result = Config::from_toml_str("cd_steps = 0");
        assert!(matches!(result, Err(DbnError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_malformed() {
        let result = Config::from_toml_str("epochs = \"many\"");
        assert!(matches!(result, Err(DbnError::ConfigParse(_))));
    }
}
