// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here.
//
//   lora.rs       - dense layer with optional low-rank adapters
//   encoder.rs    - multi-head attention and post-LN blocks
//   model.rs      - text encoder, audio encoder, fusion head
//   state_dict.rs - flat "dotted.name" view of parameters
//   scheduler.rs  - warmup + cosine learning rate
//   optim.rs      - step plan and AdamW
//   trainer.rs    - EpochRunner on a Burn autodiff backend
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Devlin et al. (2019) BERT
//            Gong et al. (2021) AST
//            Hu et al. (2021) LoRA

/// Dense layer with low-rank adapters
pub mod lora;

/// Transformer encoder blocks
pub mod encoder;

/// Encoders and the audio/text classifier
pub mod model;

/// Named parameter mapping for checkpoints
pub mod state_dict;

/// Warmup-cosine learning-rate schedule
pub mod scheduler;

/// Step plan and optimiser construction
pub mod optim;

/// Burn-backed epoch runner
pub mod trainer;
