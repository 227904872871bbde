// ============================================================
// Layer 3 - Dataset Record
// ============================================================
// One row of a train / dev split. The CSV header is
//
//   text,audio_path,label
//
// `audio_path` may be relative; the loader resolves it against
// --data_path before anything opens the file.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that come from the shape of the data itself rather than I/O.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("the {split} split contains no rows")]
    EmptyDataset { split: &'static str },

    #[error("label '{0}' is not part of the label set")]
    UnknownLabel(String),

    #[error("audio '{path}': {reason}")]
    Audio { path: String, reason: String },
}

/// A single labelled text + audio example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Free text paired with the clip (caption, question, retrieved context)
    pub text: String,

    /// Path to a WAV file
    pub audio_path: String,

    /// Class name
    pub label: String,
}

impl DatasetRecord {
    pub fn new(
        text:       impl Into<String>,
        audio_path: impl Into<String>,
        label:      impl Into<String>,
    ) -> Self {
        Self {
            text:       text.into(),
            audio_path: audio_path.into(),
            label:      label.into(),
        }
    }
}

// ─── LabelSet ─────────────────────────────────────────────────────────────────
/// Sorted vocabulary of class names. The position of a name is its class id,
/// so the same rows always produce the same ids regardless of row order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DatasetRecord>) -> Self {
        let labels: BTreeSet<&str> = records.into_iter().map(|r| r.label.as_str()).collect();
        Self {
            labels: labels.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn index_of(&self, label: &str) -> Result<usize, DataError> {
        self.labels
            .binary_search_by(|l| l.as_str().cmp(label))
            .map_err(|_| DataError::UnknownLabel(label.to_string()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }
}
