// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// File-system and process concerns shared by the other layers:
//
//   model_store.rs - pretrained model directories: tokenizer,
//                    config.json, preprocessor_config.json and
//                    optional Burn records
//
//   checkpoint.rs  - adapter weights as safetensors, plus the
//                    JSON side files of a run
//
//   metrics.rs     - one CSV row per epoch
//
//   seed.rs        - RNG seeding and device selection
//
// Reference: Burn Book §5 (Records and Checkpointing)

/// Adapter checkpoint writer
pub mod checkpoint;

/// Pretrained model directory access
pub mod model_store;

/// Training metrics CSV logger
pub mod metrics;

/// Seeding and device selection
pub mod seed;
