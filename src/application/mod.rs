// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor code and no file
// formats here. The use case wires the layers together; the
// orchestrator owns the epoch sequence.
//
// Reference: Clean Architecture pattern

/// The fine-tuning workflow
pub mod train_use_case;

/// Backend-agnostic epoch loop
pub mod orchestrator;
