use serde::{Deserialize, Serialize};

/// Mean loss and accuracy over one full pass of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EpochStats {
    pub loss:     f64,
    pub accuracy: f64,
    pub batches:  usize,
    pub samples:  usize,
}

impl EpochStats {
    /// Fold per-batch sums into means. A pass over zero batches yields NaN loss
    /// and zero accuracy instead of dividing by zero.
    pub fn from_totals(loss_sum: f64, correct: usize, batches: usize, samples: usize) -> Self {
        let loss     = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        let accuracy = if samples > 0 { correct as f64 / samples as f64 } else { 0.0 };
        Self { loss, accuracy, batches, samples }
    }
}
