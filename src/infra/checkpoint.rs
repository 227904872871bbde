// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Only the adapter weights are persisted. The frozen encoders
// are reproducible from their pretrained directories, so a
// checkpoint is a small safetensors file:
//
//   <output_path>/
//     weights/
//       <save_model_name>_<seed>_LORA.safetensors
//     run_config.json
//     labels.json
//
// One file per run. A better epoch overwrites it.
//
// Tensors are stored F32 little-endian with metadata
// {"format": "pt"} so PEFT-style loaders accept them.

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::{Path, PathBuf}};
use safetensors::tensor::{Dtype, TensorView};
use serde::Serialize;

use crate::ml::state_dict::StateDict;

pub struct CheckpointManager {
    /// Run output directory
    dir:     PathBuf,
    /// Full path of the adapter file this run writes
    adapter: PathBuf,
}

impl CheckpointManager {
    /// Creates `<dir>/weights` up front so a failed mkdir surfaces before
    /// the first epoch rather than after it.
    pub fn new(dir: impl Into<PathBuf>, save_name: &str, seed: u64) -> Result<Self> {
        let dir     = dir.into();
        let weights = dir.join("weights");
        fs::create_dir_all(&weights)
            .with_context(|| format!("Cannot create '{}'", weights.display()))?;
        let adapter = weights.join(Self::adapter_file_name(save_name, seed));
        Ok(Self { dir, adapter })
    }

    pub fn adapter_file_name(save_name: &str, seed: u64) -> String {
        format!("{save_name}_{seed}_LORA.safetensors")
    }

    pub fn adapter_path(&self) -> &Path {
        &self.adapter
    }

    /// Write `tensors` to the adapter file, replacing any previous one.
    pub fn save_adapters(&self, tensors: &StateDict) -> Result<PathBuf> {
        let encoded: Vec<(&str, Vec<u8>, &[usize])> = tensors
            .iter()
            .map(|(name, t)| {
                let bytes: Vec<u8> = bytemuck::cast_slice(&t.values).to_vec();
                (name.as_str(), bytes, t.shape.as_slice())
            })
            .collect();

        let views = encoded
            .iter()
            .map(|(name, bytes, shape)| {
                TensorView::new(Dtype::F32, shape.to_vec(), bytes)
                    .map(|v| (*name, v))
                    .map_err(|e| anyhow::anyhow!("Invalid tensor '{name}': {e}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut metadata = HashMap::new();
        metadata.insert("format".to_string(), "pt".to_string());

        let bytes = safetensors::serialize(views, Some(metadata))
            .map_err(|e| anyhow::anyhow!("safetensors serialisation failed: {e}"))?;

        fs::write(&self.adapter, bytes)
            .with_context(|| format!("Cannot write checkpoint '{}'", self.adapter.display()))?;

        tracing::debug!(
            "Saved {} adapter tensors ({} values) to '{}'",
            tensors.len(),
            tensors.values().map(|t| t.numel()).sum::<usize>(),
            self.adapter.display(),
        );
        Ok(self.adapter.clone())
    }

    /// Pretty-print any serialisable value to `<dir>/<file_name>`.
    pub fn save_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(path)
    }
}
