// ============================================================
// Layer 6 - Metrics Logger
// ============================================================
// Appends one CSV row per epoch to <output_path>/metrics.csv:
//
//   epoch,train_loss,train_acc,dev_loss,dev_acc,lr
//   0,1.098612,0.375000,1.097000,0.500000,0.000100
//   1,1.071300,0.437500,1.085100,0.500000,0.000050
//
// The header is written once; later runs into the same
// directory keep appending.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::domain::epoch::EpochStats;

const HEADER: &str = "epoch,train_loss,train_acc,dev_loss,dev_acc,lr";

/// One row of metrics for a single epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 0-based epoch index
    pub epoch:      usize,
    pub train_loss: f64,
    pub train_acc:  f64,
    pub dev_loss:   f64,
    pub dev_acc:    f64,
    /// Learning rate at the end of the epoch
    pub lr:         f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train: &EpochStats, dev: &EpochStats, lr: f64) -> Self {
        Self {
            epoch,
            train_loss: train.loss,
            train_acc:  train.accuracy,
            dev_loss:   dev.loss,
            dev_acc:    dev.accuracy,
            lr,
        }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.8}",
            m.epoch, m.train_loss, m.train_acc, m.dev_loss, m.dev_acc, m.lr,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, dev_acc={:.4}",
            m.epoch, m.train_loss, m.dev_acc,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
