// ============================================================
// Layer 4 - CSV Split Loader
// ============================================================
// Reads one dataset split from a CSV file with the header
//
//   text,audio_path,label
//
// Extra columns are ignored, so retrieval outputs that carry
// scores or ids next to these three load unchanged.
//
// Relative audio paths are rewritten against the data root so
// later stages can open them without knowing where the CSV was.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::record::DatasetRecord;
use crate::domain::traits::RecordSource;

/// Loads every row of one split file.
pub struct CsvLoader {
    /// The CSV file itself
    csv_path: PathBuf,
    /// Directory that relative audio paths are resolved against
    data_root: PathBuf,
}

impl CsvLoader {
    pub fn new(csv_path: impl Into<PathBuf>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            csv_path:  csv_path.into(),
            data_root: data_root.into(),
        }
    }

    fn resolve_audio(&self, audio_path: &str) -> String {
        let p = Path::new(audio_path);
        if p.is_absolute() {
            audio_path.to_string()
        } else {
            self.data_root.join(p).to_string_lossy().into_owned()
        }
    }
}

impl RecordSource for CsvLoader {
    fn load_all(&self) -> Result<Vec<DatasetRecord>> {
        // A missing split is fatal: there is no demo mode for training
        let mut reader = csv::Reader::from_path(&self.csv_path)
            .with_context(|| format!("Cannot open split '{}'", self.csv_path.display()))?;

        let mut records = Vec::new();
        for (row, result) in reader.deserialize::<DatasetRecord>().enumerate() {
            let mut record = result.with_context(|| {
                format!("Malformed row {} in '{}'", row + 1, self.csv_path.display())
            })?;
            record.audio_path = self.resolve_audio(&record.audio_path);
            records.push(record);
        }

        tracing::info!(
            "Loaded {} rows from '{}'",
            records.len(),
            self.csv_path.display()
        );
        Ok(records)
    }
}
