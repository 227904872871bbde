// ============================================================
// Layer 3 - Core Traits
// ============================================================
// The two seams of a training run:
//
//   RecordSource - where labelled rows come from
//                  (CsvLoader reads a split file)
//   EpochRunner  - one pass of training, one pass of validation
//                  and a checkpoint write, whatever the backend
//
// The epoch loop in the application layer only sees EpochRunner,
// so it is tested with a scripted runner and driven in
// production by the Burn implementation in ml::trainer.

use std::path::PathBuf;

use anyhow::Result;

use crate::domain::{epoch::EpochStats, record::DatasetRecord};

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Any component that can produce the rows of one dataset split.
pub trait RecordSource {
    fn load_all(&self) -> Result<Vec<DatasetRecord>>;
}

// ─── EpochRunner ──────────────────────────────────────────────────────────────
/// Backend-specific work for a single epoch.
///
/// `train_epoch` updates parameters; `validate` must not. Errors from either
/// abort the run: callers never retry.
pub trait EpochRunner {
    /// One full pass of gradient updates over the training split.
    fn train_epoch(&mut self, epoch: usize) -> Result<EpochStats>;

    /// One full pass over the validation split with gradients disabled.
    fn validate(&mut self) -> Result<EpochStats>;

    /// Persist the adapter weights as they are now; returns the file written.
    fn save_checkpoint(&self) -> Result<PathBuf>;

    /// Learning rate the next optimisation step will use.
    fn current_lr(&self) -> f64;
}
