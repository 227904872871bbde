// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// From CSV rows to device tensors:
//
//   train.csv / dev.csv
//       │
//       ▼
//   CsvLoader              -> DatasetRecord (text, wav, label)
//       │
//       ▼
//   Featurizer             -> tokenizer ids + mask
//       │                     AudioFeatureExtractor log-mel
//       ▼
//   AudioTextDataset       -> Burn Dataset
//       │
//       ▼
//   AudioTextBatcher       -> Burn Batcher
//       │
//       ▼
//   DataLoader             -> batches for the epoch loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads a split CSV into DatasetRecords
pub mod loader;

/// WAV decoding, resampling and log-mel features
pub mod audio;

/// Tokenises text and featurises audio per record
pub mod featurizer;

/// Implements Burn's Dataset trait for featurised samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
