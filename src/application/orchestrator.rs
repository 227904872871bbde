// ============================================================
// Layer 2 - Epoch Orchestrator
// ============================================================
// Drives a run as a small state machine:
//
//   NotStarted -> EpochInProgress(0) -> EpochComplete(0)
//              -> EpochInProgress(1) -> ...
//              -> Finished
//
// Each epoch trains, validates, checkpoints on a strictly better
// dev accuracy and prints its progress block. Any error ends the
// run where it happened.

use std::io::Write;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::traits::EpochRunner;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};

const BANNER: &str = "----------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    NotStarted,
    EpochInProgress(usize),
    EpochComplete(usize),
    Finished,
}

/// Running maximum of dev accuracy. Starts at 0, so an epoch at 0.0
/// accuracy never counts as an improvement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestAccuracy {
    pub value: f64,
    pub epoch: Option<usize>,
}

impl BestAccuracy {
    /// True (and recorded) only when `accuracy` beats the best so far.
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> bool {
        if accuracy > self.value {
            self.value = accuracy;
            self.epoch = Some(epoch);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub best_accuracy:       f64,
    pub best_epoch:          Option<usize>,
    pub checkpoints_written: usize,
}

/// Run `epochs` epochs on `runner`, writing progress to `out`.
pub fn run_epochs<R: EpochRunner, W: Write>(
    runner:  &mut R,
    epochs:  usize,
    out:     &mut W,
    metrics: Option<&MetricsLogger>,
) -> Result<TrainingSummary> {
    let mut phase       = TrainingPhase::NotStarted;
    let mut best        = BestAccuracy::default();
    let mut checkpoints = 0usize;
    tracing::debug!("phase {phase:?}");

    for epoch in 0..epochs {
        phase = TrainingPhase::EpochInProgress(epoch);
        tracing::debug!("phase {phase:?}");

        writeln!(out, "{BANNER}")?;
        writeln!(out, "Epoch {}/{}", epoch, epochs - 1)?;
        writeln!(out, "{BANNER}")?;

        let train = runner.train_epoch(epoch)?;
        let dev   = runner.validate()?;
        tracing::debug!("{} train batches, {} dev batches", train.batches, dev.batches);

        if best.observe(epoch, dev.accuracy) {
            let path = runner.save_checkpoint()?;
            checkpoints += 1;
            tracing::info!(
                "Dev accuracy improved to {:.4} at epoch {}; saved '{}'",
                dev.accuracy, epoch, path.display(),
            );
        }

        writeln!(out, "Train loss {} accuracy {}", train.loss, train.accuracy)?;
        writeln!(out, "Dev loss {} accuracy {}", dev.loss, dev.accuracy)?;
        writeln!(out)?;

        if let Some(logger) = metrics {
            logger.log(&EpochMetrics::new(epoch, &train, &dev, runner.current_lr()))?;
        }

        phase = TrainingPhase::EpochComplete(epoch);
        tracing::debug!("phase {phase:?}");
    }

    writeln!(out, "Best dev acc {}", best.value)?;
    phase = TrainingPhase::Finished;
    tracing::debug!("phase {phase:?}");

    Ok(TrainingSummary {
        best_accuracy:       best.value,
        best_epoch:          best.epoch,
        checkpoints_written: checkpoints,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::epoch::EpochStats;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Replays fixed dev accuracies and records what the loop asked for.
    struct ScriptedRunner {
        dev_acc:     Vec<f64>,
        fail_at:     Option<usize>,
        trained:     Vec<usize>,
        validations: usize,
    }

    impl ScriptedRunner {
        fn new(dev_acc: &[f64]) -> Self {
            Self { dev_acc: dev_acc.to_vec(), fail_at: None, trained: vec![], validations: 0 }
        }
    }

    impl EpochRunner for ScriptedRunner {
        fn train_epoch(&mut self, epoch: usize) -> Result<EpochStats> {
            if self.fail_at == Some(epoch) {
                anyhow::bail!("device lost");
            }
            self.trained.push(epoch);
            Ok(EpochStats { loss: 1.0, accuracy: 0.5, batches: 2, samples: 16 })
        }

        fn validate(&mut self) -> Result<EpochStats> {
            let accuracy = self.dev_acc[self.validations];
            self.validations += 1;
            Ok(EpochStats { loss: 0.5, accuracy, batches: 1, samples: 8 })
        }

        fn save_checkpoint(&self) -> Result<PathBuf> {
            Ok(PathBuf::from("adapter.safetensors"))
        }

        fn current_lr(&self) -> f64 {
            1e-4
        }
    }

    /// Wraps the scripted runner to count saves, since save takes &self.
    struct Counting(ScriptedRunner, std::cell::RefCell<Vec<usize>>);

    impl EpochRunner for Counting {
        fn train_epoch(&mut self, epoch: usize) -> Result<EpochStats> {
            self.0.train_epoch(epoch)
        }
        fn validate(&mut self) -> Result<EpochStats> {
            self.0.validate()
        }
        fn save_checkpoint(&self) -> Result<PathBuf> {
            self.1.borrow_mut().push(self.0.validations - 1);
            self.0.save_checkpoint()
        }
        fn current_lr(&self) -> f64 {
            self.0.current_lr()
        }
    }

    #[test]
    fn test_checkpoint_only_on_strict_improvement() {
        let mut r   = Counting(ScriptedRunner::new(&[0.5, 0.4, 0.6, 0.6, 0.7]), Default::default());
        let mut out = Vec::new();
        let summary = run_epochs(&mut r, 5, &mut out, None).unwrap();

        assert_eq!(*r.1.borrow(), vec![0, 2, 4]);
        assert_eq!(summary.checkpoints_written, 3);
        assert_eq!(summary.best_accuracy, 0.7);
        assert_eq!(summary.best_epoch, Some(4));
    }

    #[test]
    fn test_zero_accuracy_never_checkpoints() {
        let mut r   = Counting(ScriptedRunner::new(&[0.0, 0.0]), Default::default());
        let summary = run_epochs(&mut r, 2, &mut Vec::new(), None).unwrap();
        assert_eq!(summary.checkpoints_written, 0);
        assert_eq!(summary.best_epoch, None);
    }

    #[test]
    fn test_progress_text() {
        let mut r   = ScriptedRunner::new(&[0.25, 0.75]);
        let mut out = Vec::new();
        run_epochs(&mut r, 2, &mut out, None).unwrap();

        let expected = "\
----------
Epoch 0/1
----------
Train loss 1 accuracy 0.5
Dev loss 0.5 accuracy 0.25

----------
Epoch 1/1
----------
Train loss 1 accuracy 0.5
Dev loss 0.5 accuracy 0.75

Best dev acc 0.75
";
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_error_stops_the_run() {
        let mut r = ScriptedRunner::new(&[0.5, 0.6, 0.7]);
        r.fail_at = Some(1);
        let mut out = Vec::new();

        let err = run_epochs(&mut r, 3, &mut out, None).unwrap_err();
        assert!(err.to_string().contains("device lost"));
        assert_eq!(r.trained, vec![0]);
        assert!(!String::from_utf8(out).unwrap().contains("Best dev acc"));
    }

    #[test]
    fn test_metrics_rows_per_epoch() {
        let tmp     = TempDir::new().unwrap();
        let metrics = MetricsLogger::new(tmp.path()).unwrap();
        let mut r   = ScriptedRunner::new(&[0.1, 0.2, 0.3]);
        run_epochs(&mut r, 3, &mut Vec::new(), Some(&metrics)).unwrap();

        let text = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_best_accuracy_is_strict() {
        let mut best = BestAccuracy::default();
        assert!(best.observe(0, 0.5));
        assert!(!best.observe(1, 0.5));
        assert!(best.observe(2, 0.5000001));
        assert_eq!(best.epoch, Some(2));
    }
}
