//! Minibatch scheduling and training reports.

use serde::{Deserialize, Serialize};

use crate::utils::{self, RandomSource};

/// Partition a fresh random permutation of `0..n_samples` into full minibatches.
///
/// Produces `n_samples / batch_size` batches of exactly `batch_size` indices;
/// trailing samples that do not fill a batch are dropped. A permutation is drawn
/// even when no batch results.
pub fn shuffled_batches(
    n_samples: usize,
    batch_size: usize,
    rng: &mut RandomSource,
) -> Vec<Vec<usize>> {
    let order = utils::permutation(n_samples, rng);
    if batch_size == 0 {
        return Vec::new();
    }
    order
        .chunks_exact(batch_size)
        .map(<[usize]>::to_vec)
        .collect()
}

/// Per-layer, per-epoch reconstruction errors from greedy pretraining.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PretrainReport {
    /// `layer_errors[i][e]` is layer `i`'s mean reconstruction error in epoch `e`
    pub layer_errors: Vec<Vec<f32>>,
}

impl PretrainReport {
    /// Last recorded epoch error of each layer (`None` if a layer recorded none).
    #[must_use]
    pub fn final_errors(&self) -> Vec<Option<f32>> {
        self.layer_errors
            .iter()
            .map(|errors| errors.last().copied())
            .collect()
    }

    /// Flatten into one record per layer-epoch, in training order.
    #[must_use]
    pub fn records(&self) -> Vec<EpochRecord> {
        self.layer_errors
            .iter()
            .enumerate()
            .flat_map(|(layer, errors)| {
                errors
                    .iter()
                    .enumerate()
                    .map(move |(epoch, &reconstruction_error)| EpochRecord {
                        layer,
                        epoch: epoch + 1,
                        reconstruction_error,
                    })
            })
            .collect()
    }
}

/// One line of the JSONL metrics stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub layer: usize,
    pub epoch: usize,
    pub reconstruction_error: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::random_source;

    #[test]
    fn test_batches_drop_remainder() {
        let mut rng = random_source(Some(0));
        let batches = shuffled_batches(23, 5, &mut rng);
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 5));

        let mut seen: Vec<usize> = batches.concat();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_batch_larger_than_samples() {
        let mut rng = random_source(Some(0));
        assert!(shuffled_batches(3, 10, &mut rng).is_empty());
    }

    #[test]
    fn test_fresh_permutation_each_call() {
        let mut rng = random_source(Some(11));
        let first = shuffled_batches(50, 50, &mut rng);
        let second = shuffled_batches(50, 50, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn test_report_records() {
        let report = PretrainReport {
            layer_errors: vec![vec![0.3, 0.2], vec![0.1]],
        };
        assert_eq!(report.final_errors(), vec![Some(0.2), Some(0.1)]);

        let records = report.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].layer, 1);
        assert_eq!(records[2].epoch, 1);
    }
}
