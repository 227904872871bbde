// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types and traits that describe a fine-tuning run
// without naming any framework:
//
//   record.rs         - one CSV row (text, audio file, label)
//                       and the label vocabulary built from them
//   epoch.rs          - loss / accuracy produced by one pass
//   adapter_filter.rs - selects the adapter parameters that go
//                       into a checkpoint
//   traits.rs         - seams implemented by the data and ml layers
//
// Nothing here touches Burn, files or the network, so every
// piece is unit tested without a device.

/// Dataset rows and label vocabulary
pub mod record;

/// Per-epoch statistics
pub mod epoch;

/// Adapter-weight filtering for checkpoints
pub mod adapter_filter;

/// Core abstractions that other layers implement
pub mod traits;
