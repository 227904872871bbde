// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Runs one fine-tuning job in order:
//
//   Step 1: Validate the adapter bias mode   (Layer 3 - domain)
//   Step 2: Load train / dev CSV records     (Layer 4 - data)
//   Step 3: Build and save the label set     (Layer 3 / 6)
//   Step 4: Tokenizer + feature extractor    (Layer 6 - infra)
//   Step 5: Featurise both splits            (Layer 4 - data)
//   Step 6: Save the run config              (Layer 6 - infra)
//   Step 7: Build model and epoch runner     (Layer 5 - ml)
//   Step 8: Run the epoch loop               (Layer 2)
//
// Reference: Burn Book §5 (Training)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::orchestrator::{run_epochs, TrainingSummary};
use crate::data::{
    audio::{AudioFeatureExtractor, FeatureExtractorConfig},
    dataset::AudioTextDataset,
    featurizer::Featurizer,
    loader::CsvLoader,
};
use crate::domain::{
    adapter_filter::BiasMode,
    record::{DataError, DatasetRecord, LabelSet},
    traits::RecordSource,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    model_store::ModelStore,
};
use crate::ml::{lora::LoraConfig, trainer};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every option of a run. Serialised to run_config.json next to the
// checkpoint so a run can be reproduced from its output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs:              usize,
    pub batch_size:          usize,
    pub lr:                  f64,
    /// GPU index, "cpu", or anything else for the default adapter
    pub device:              String,
    pub seed:                u64,
    /// Root of the CSV files and of relative audio paths
    pub data_path:           String,
    pub output_path:         String,
    pub language_model_name: String,
    pub audio_model_name:    String,
    pub save_model_name:     String,
    pub train_file:          String,
    pub dev_file:            String,
    pub models_dir:          String,
    pub max_seq_len:         usize,
    pub lora_rank:           usize,
    pub lora_alpha:          f64,
    pub lora_dropout:        f64,
    /// Adapter filter mode: none, all, LoRA, AdaLoRA or IA3
    pub lora_bias:           String,
    pub weight_decay:        f64,
    pub num_workers:         usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs:              20,
            batch_size:          8,
            lr:                  1e-4,
            device:              "0".to_string(),
            seed:                42,
            data_path:           "./".to_string(),
            output_path:         "./outputs".to_string(),
            language_model_name: "google-bert/bert-base-uncased".to_string(),
            audio_model_name:    "MIT/ast-finetuned-audioset-10-10-0.4593".to_string(),
            save_model_name:     "audio-bert".to_string(),
            train_file:          "train.csv".to_string(),
            dev_file:            "dev.csv".to_string(),
            models_dir:          "./models".to_string(),
            max_seq_len:         128,
            lora_rank:           8,
            lora_alpha:          16.0,
            lora_dropout:        0.1,
            lora_bias:           "LoRA".to_string(),
            weight_decay:        0.01,
            num_workers:         1,
        }
    }
}

impl TrainConfig {
    pub fn lora(&self) -> LoraConfig {
        LoraConfig::new()
            .with_rank(self.lora_rank)
            .with_alpha(self.lora_alpha)
            .with_dropout(self.lora_dropout)
    }

    pub fn bias_mode(&self) -> Result<BiasMode> {
        Ok(self.lora_bias.parse::<BiasMode>()?)
    }

    fn split_path(&self, file: &str) -> PathBuf {
        Path::new(&self.data_path).join(file)
    }
}

/// Featurised splits plus what was learned about them.
pub struct PreparedData {
    pub train:    AudioTextDataset,
    pub dev:      AudioTextDataset,
    pub labels:   LabelSet,
    pub features: FeatureExtractorConfig,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Full run on `device`; progress goes to stdout.
    pub fn execute(&self, device: &burn::backend::wgpu::WgpuDevice) -> Result<TrainingSummary> {
        type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<MyBackend, _>(device, &mut std::io::stdout().lock())
    }

    /// Same as `execute`, generic over backend and progress sink.
    pub fn execute_on<B, W>(&self, device: &B::Device, out: &mut W) -> Result<TrainingSummary>
    where
        B: burn::tensor::backend::AutodiffBackend,
        W: std::io::Write,
    {
        let cfg = &self.config;

        // ── Step 1: Fail fast on an unsupported filter mode ───────────────────
        let bias_mode = cfg.bias_mode()?;

        // ── Step 2-6: Records, labels, features, config ───────────────────────
        let checkpoints = CheckpointManager::new(&cfg.output_path, &cfg.save_model_name, cfg.seed)?;
        let store       = ModelStore::new(&cfg.models_dir);
        tracing::info!("Best adapters will be written to '{}'", checkpoints.adapter_path().display());
        let data        = self.prepare_data(&store)?;

        checkpoints.save_json("labels.json", &data.labels.names())?;
        checkpoints.save_json("run_config.json", cfg)?;

        // ── Step 7: Model and runner (Layer 5) ────────────────────────────────
        let model = trainer::build_classifier::<B>(
            cfg, &store, &data.features, data.labels.len(), device,
        )?;
        let mut runner = trainer::build_runner(
            model, data.train, data.dev, cfg, checkpoints, bias_mode, device,
        )?;

        // ── Step 8: Epoch loop ────────────────────────────────────────────────
        let metrics = MetricsLogger::new(&cfg.output_path)?;
        let summary = run_epochs(&mut runner, cfg.epochs, out, Some(&metrics))?;

        tracing::info!(
            "Training complete: best dev accuracy {:.4} ({} checkpoint writes)",
            summary.best_accuracy, summary.checkpoints_written,
        );
        Ok(summary)
    }

    /// Steps 2 to 5: CSVs to featurised datasets.
    pub fn prepare_data(&self, store: &ModelStore) -> Result<PreparedData> {
        let cfg = &self.config;

        let train_records = load_split(cfg, &cfg.train_file, "train")?;
        let dev_records   = load_split(cfg, &cfg.dev_file, "dev")?;

        let labels = LabelSet::from_records(train_records.iter().chain(dev_records.iter()));
        tracing::info!("{} classes: {:?}", labels.len(), labels.names());

        let tokenizer  = store.tokenizer(&cfg.language_model_name)?;
        let features   = store.feature_config(&cfg.audio_model_name)?;
        let featurizer = Featurizer::new(
            tokenizer,
            AudioFeatureExtractor::new(features.clone()),
            labels,
            cfg.max_seq_len,
        );

        let train = featurizer.featurize_all(&train_records).context("Featurising train split")?;
        let dev   = featurizer.featurize_all(&dev_records).context("Featurising dev split")?;
        tracing::info!("Featurised {} train and {} dev samples", train.len(), dev.len());

        Ok(PreparedData {
            train:    AudioTextDataset::new(train),
            dev:      AudioTextDataset::new(dev),
            labels:   featurizer.labels().clone(),
            features,
        })
    }
}

fn load_split(cfg: &TrainConfig, file: &str, split: &'static str) -> Result<Vec<DatasetRecord>> {
    let path    = cfg.split_path(file);
    let records = CsvLoader::new(&path, &cfg.data_path)
        .load_all()
        .with_context(|| format!("Cannot load {split} split"))?;
    if records.is_empty() {
        return Err(DataError::EmptyDataset { split }.into());
    }
    tracing::info!("Loaded {} {split} records from '{}'", records.len(), path.display());
    Ok(records)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::adapter_filter::AdapterError;
    use crate::test_fixtures::{sine, write_tokenizer, write_wav};
    use burn::backend::{Autodiff, NdArray};
    use std::fs;
    use tempfile::TempDir;

    /// A data dir with `n_train` / `n_dev` rows over two labels, a tiny
    /// tokenizer and small encoder configs under `models/`.
    fn fixture(n_train: usize, n_dev: usize) -> (TempDir, TrainConfig) {
        let tmp  = TempDir::new().unwrap();
        let root = tmp.path();

        write_wav(&root.join("bark.wav"), 16_000, 1, &sine(16_000, 440.0, 0.2));
        write_wav(&root.join("meow.wav"), 8_000, 2, &sine(8_000, 880.0, 0.2));

        let rows = |n: usize| {
            let mut csv = String::from("text,audio_path,label\n");
            for i in 0..n {
                if i % 2 == 0 {
                    csv.push_str("the dog barks,bark.wav,dog\n");
                } else {
                    csv.push_str("the cat meows,meow.wav,cat\n");
                }
            }
            csv
        };
        fs::write(root.join("train.csv"), rows(n_train)).unwrap();
        fs::write(root.join("dev.csv"), rows(n_dev)).unwrap();

        let bert = root.join("models").join("bert");
        let ast  = root.join("models").join("ast");
        fs::create_dir_all(&bert).unwrap();
        fs::create_dir_all(&ast).unwrap();
        write_tokenizer(&bert, &["the", "dog", "barks", "cat", "meows"]);
        let small = r#"{"hidden_size": 8, "num_hidden_layers": 1, "num_attention_heads": 2,
                        "intermediate_size": 16, "vocab_size": 16, "max_position_embeddings": 8}"#;
        fs::write(bert.join("config.json"), small).unwrap();
        fs::write(ast.join("config.json"), small).unwrap();
        fs::write(ast.join("preprocessor_config.json"), r#"{"num_mel_bins": 8, "max_length": 6}"#).unwrap();

        let cfg = TrainConfig {
            epochs:              2,
            batch_size:          8,
            lr:                  1e-3,
            data_path:           root.to_string_lossy().into(),
            output_path:         root.join("out").to_string_lossy().into(),
            models_dir:          root.join("models").to_string_lossy().into(),
            language_model_name: "bert".into(),
            audio_model_name:    "ast".into(),
            max_seq_len:         8,
            lora_rank:           2,
            ..TrainConfig::default()
        };
        (tmp, cfg)
    }

    #[test]
    fn test_defaults_match_cli() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.epochs, 20);
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.lr, 1e-4);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.output_path, "./outputs");
        assert_eq!(cfg.save_model_name, "audio-bert");
        assert_eq!(cfg.bias_mode().unwrap(), BiasMode::LoRA);
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg  = TrainConfig::default();
        let back: TrainConfig = serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_prepare_data_shapes() {
        let (_tmp, cfg) = fixture(4, 2);
        let uc   = TrainUseCase::new(cfg.clone());
        let data = uc.prepare_data(&ModelStore::new(&cfg.models_dir)).unwrap();

        assert_eq!(data.labels.names(), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(burn::data::dataset::Dataset::len(&data.train), 4);
        let s = burn::data::dataset::Dataset::get(&data.dev, 0).unwrap();
        assert_eq!(s.input_ids.len(), 8);
        assert_eq!(s.num_frames, 6);
        assert_eq!(s.num_mel_bins, 8);
        assert_eq!(s.label, 1);
    }

    #[test]
    fn test_empty_dev_split_rejected() {
        let (_tmp, cfg) = fixture(4, 0);
        let err = TrainUseCase::new(cfg.clone())
            .prepare_data(&ModelStore::new(&cfg.models_dir))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::EmptyDataset { split: "dev" })
        ));
    }

    #[test]
    fn test_unknown_bias_mode_fails_before_any_output() {
        let (_tmp, mut cfg) = fixture(4, 2);
        cfg.lora_bias = "lora_only".into();
        let err = TrainUseCase::new(cfg.clone())
            .execute_on::<Autodiff<NdArray>, _>(&Default::default(), &mut Vec::new())
            .unwrap_err();
        assert!(err.downcast_ref::<AdapterError>().is_some());
        assert!(!Path::new(&cfg.output_path).exists());
    }

    #[test]
    fn test_full_run_writes_side_files() {
        let (_tmp, cfg) = fixture(16, 8);
        let mut out = Vec::new();
        let summary = TrainUseCase::new(cfg.clone())
            .execute_on::<Autodiff<NdArray>, _>(&Default::default(), &mut out)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Epoch ").count(), 2);
        assert_eq!(text.matches("Best dev acc").count(), 1);

        let out_dir = Path::new(&cfg.output_path);
        assert!(out_dir.join("labels.json").exists());
        assert!(out_dir.join("run_config.json").exists());
        let metrics = fs::read_to_string(out_dir.join("metrics.csv")).unwrap();
        assert_eq!(metrics.lines().count(), 3);

        let adapter = out_dir.join("weights").join("audio-bert_42_LORA.safetensors");
        assert_eq!(adapter.exists(), summary.checkpoints_written > 0);
    }
}
