// ============================================================
// Layer 6 - Model Store
// ============================================================
// Resolves a model name to a local directory and reads what
// the run needs from it:
//
//   <models_dir>/google-bert/bert-base-uncased/
//     config.json               encoder hyper-parameters
//     tokenizer.json            HuggingFace tokenizer
//     model.mpk                 pretrained Burn record (optional)
//
//   <models_dir>/MIT/ast-finetuned-audioset-10-10-0.4593/
//     config.json
//     preprocessor_config.json  feature extractor settings
//     model.mpk
//
// A name that is itself an existing directory is used as-is.
// Nothing is downloaded.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use tokenizers::Tokenizer;

use crate::data::audio::FeatureExtractorConfig;
use crate::ml::encoder::EncoderConfig;
use crate::ml::model::{AudioEncoder, AudioEncoderConfig, TextEncoder, TextEncoderConfig};

/// File name stem of a pretrained record.
const PRETRAINED_STEM: &str = "model";

/// Extension `CompactRecorder` (named MessagePack, half precision) writes.
const PRETRAINED_EXT: &str = "mpk";

/// The subset of a HuggingFace `config.json` the encoders use.
/// Missing keys take BERT-base / AST-base values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderHparams {
    pub hidden_size:             usize,
    pub num_hidden_layers:       usize,
    pub num_attention_heads:     usize,
    pub intermediate_size:       usize,
    pub hidden_dropout_prob:     f64,
    pub layer_norm_eps:          f64,
    pub vocab_size:              usize,
    pub max_position_embeddings: usize,
}

impl Default for EncoderHparams {
    fn default() -> Self {
        Self {
            hidden_size:             768,
            num_hidden_layers:       12,
            num_attention_heads:     12,
            intermediate_size:       3072,
            hidden_dropout_prob:     0.1,
            layer_norm_eps:          1e-12,
            vocab_size:              30_522,
            max_position_embeddings: 512,
        }
    }
}

impl EncoderHparams {
    pub fn encoder(&self) -> EncoderConfig {
        EncoderConfig::new(
            self.hidden_size,
            self.num_hidden_layers,
            self.num_attention_heads,
            self.intermediate_size,
        )
        .with_dropout(self.hidden_dropout_prob)
        .with_layer_norm_eps(self.layer_norm_eps)
    }
}

pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self { models_dir: models_dir.into() }
    }

    /// `name` if it is a directory, otherwise `<models_dir>/<name>`.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        if direct.is_dir() {
            direct
        } else {
            self.models_dir.join(name)
        }
    }

    pub fn tokenizer(&self, name: &str) -> Result<Tokenizer> {
        let path = self.resolve(name).join("tokenizer.json");
        Tokenizer::from_file(&path).map_err(|e| {
            anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e)
        })
    }

    pub fn hparams(&self, name: &str) -> Result<EncoderHparams> {
        read_json_or_default(&self.resolve(name).join("config.json"))
    }

    pub fn feature_config(&self, name: &str) -> Result<FeatureExtractorConfig> {
        read_json_or_default(&self.resolve(name).join("preprocessor_config.json"))
    }

    /// Text encoder shape, capped so positions cover `max_seq_len`.
    pub fn text_encoder_config(&self, name: &str, max_seq_len: usize) -> Result<TextEncoderConfig> {
        let hp = self.hparams(name)?;
        Ok(TextEncoderConfig::new(
            hp.encoder(),
            hp.vocab_size,
            hp.max_position_embeddings.max(max_seq_len),
        ))
    }

    pub fn audio_encoder_config(
        &self,
        name:     &str,
        features: &FeatureExtractorConfig,
    ) -> Result<AudioEncoderConfig> {
        let hp = self.hparams(name)?;
        Ok(AudioEncoderConfig::new(hp.encoder(), features.num_mel_bins, features.max_length))
    }

    pub fn load_text_encoder<B: Backend>(
        &self,
        name:   &str,
        config: &TextEncoderConfig,
        device: &B::Device,
    ) -> Result<TextEncoder<B>> {
        let encoder = config.init(device);
        match self.pretrained_path(name) {
            Some(path) => {
                let record = CompactRecorder::new()
                    .load(path.clone(), device)
                    .with_context(|| format!("Cannot load pretrained record '{}'", path.display()))?;
                tracing::info!("Loaded pretrained language encoder from '{}'", path.display());
                Ok(encoder.load_record(record))
            }
            None => {
                tracing::warn!("No pretrained weights for '{name}'; language encoder is randomly initialised");
                Ok(encoder)
            }
        }
    }

    pub fn load_audio_encoder<B: Backend>(
        &self,
        name:   &str,
        config: &AudioEncoderConfig,
        device: &B::Device,
    ) -> Result<AudioEncoder<B>> {
        let encoder = config.init(device);
        match self.pretrained_path(name) {
            Some(path) => {
                let record = CompactRecorder::new()
                    .load(path.clone(), device)
                    .with_context(|| format!("Cannot load pretrained record '{}'", path.display()))?;
                tracing::info!("Loaded pretrained audio encoder from '{}'", path.display());
                Ok(encoder.load_record(record))
            }
            None => {
                tracing::warn!("No pretrained weights for '{name}'; audio encoder is randomly initialised");
                Ok(encoder)
            }
        }
    }

    /// Recorder path (no extension) when `model.mpk` exists.
    fn pretrained_path(&self, name: &str) -> Option<PathBuf> {
        let dir = self.resolve(name);
        dir.join(format!("{PRETRAINED_STEM}.{PRETRAINED_EXT}"))
            .is_file()
            .then(|| dir.join(PRETRAINED_STEM))
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.is_file() {
        tracing::debug!("'{}' not found, using defaults", path.display());
        return Ok(T::default());
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Malformed JSON in '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::write_tokenizer;
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn store_with(name: &str) -> (TempDir, ModelStore, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        let store = ModelStore::new(tmp.path());
        (tmp, store, dir)
    }

    #[test]
    fn test_resolve_under_models_dir() {
        let (_tmp, store, dir) = store_with("org/model");
        assert_eq!(store.resolve("org/model"), dir);
    }

    #[test]
    fn test_resolve_existing_directory_as_is() {
        let (_tmp, store, dir) = store_with("m");
        let abs = dir.to_string_lossy().to_string();
        assert_eq!(store.resolve(&abs), dir);
    }

    #[test]
    fn test_hparams_partial_json_keeps_defaults() {
        let (_tmp, store, dir) = store_with("m");
        fs::write(dir.join("config.json"), r#"{"hidden_size": 32, "num_hidden_layers": 2, "model_type": "bert"}"#).unwrap();

        let hp = store.hparams("m").unwrap();
        assert_eq!(hp.hidden_size, 32);
        assert_eq!(hp.num_hidden_layers, 2);
        assert_eq!(hp.num_attention_heads, 12);
        assert_eq!(hp.vocab_size, 30_522);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let (_tmp, store, _) = store_with("m");
        assert_eq!(store.hparams("m").unwrap(), EncoderHparams::default());
        assert_eq!(store.feature_config("m").unwrap(), FeatureExtractorConfig::default());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let (_tmp, store, dir) = store_with("m");
        fs::write(dir.join("config.json"), "{ not json").unwrap();
        assert!(store.hparams("m").is_err());
    }

    #[test]
    fn test_feature_config_overrides() {
        let (_tmp, store, dir) = store_with("ast");
        fs::write(dir.join("preprocessor_config.json"), r#"{"num_mel_bins": 64, "max_length": 100}"#).unwrap();
        let cfg = store.feature_config("ast").unwrap();
        assert_eq!(cfg.num_mel_bins, 64);
        assert_eq!(cfg.max_length, 100);
        assert_eq!(cfg.sampling_rate, 16_000);
    }

    #[test]
    fn test_tokenizer_missing_is_an_error() {
        let (_tmp, store, _) = store_with("bert");
        assert!(store.tokenizer("bert").is_err());
    }

    #[test]
    fn test_tokenizer_loads() {
        let (_tmp, store, dir) = store_with("bert");
        write_tokenizer(&dir, &["dog", "barks"]);
        let tok = store.tokenizer("bert").unwrap();
        assert_eq!(tok.token_to_id("dog"), Some(4));
    }

    #[test]
    fn test_text_positions_cover_max_seq_len() {
        let (_tmp, store, dir) = store_with("bert");
        fs::write(dir.join("config.json"), r#"{"max_position_embeddings": 16}"#).unwrap();
        let cfg = store.text_encoder_config("bert", 64).unwrap();
        assert_eq!(cfg.max_position_embeddings, 64);
    }

    #[test]
    fn test_pretrained_record_round_trip() {
        let (_tmp, store, dir) = store_with("bert");
        let device = Default::default();
        let cfg    = TextEncoderConfig::new(EncoderConfig::new(8, 1, 2, 16), 20, 6);

        let saved = cfg.init::<TestBackend>(&device);
        CompactRecorder::new()
            .record(saved.clone().into_record(), dir.join(PRETRAINED_STEM))
            .unwrap();

        assert!(store.pretrained_path("bert").is_some());
        let loaded = store.load_text_encoder::<TestBackend>("bert", &cfg, &device).unwrap();
        // Half-precision record
        saved.word_embeddings.weight.val().into_data()
            .assert_approx_eq(&loaded.word_embeddings.weight.val().into_data(), 2);
    }

    #[test]
    fn test_pretrained_audio_record_is_restored() {
        let (_tmp, store, dir) = store_with("ast");
        let device = Default::default();
        let cfg    = AudioEncoderConfig::new(EncoderConfig::new(8, 1, 2, 16), 5, 4);

        let saved = cfg.init::<TestBackend>(&device);
        CompactRecorder::new()
            .record(saved.clone().into_record(), dir.join(PRETRAINED_STEM))
            .unwrap();
        assert!(dir.join(format!("{PRETRAINED_STEM}.{PRETRAINED_EXT}")).is_file());

        let loaded = store.load_audio_encoder::<TestBackend>("ast", &cfg, &device).unwrap();
        saved.frame_projection.weight.val().into_data()
            .assert_approx_eq(&loaded.frame_projection.weight.val().into_data(), 2);
    }

    #[test]
    fn test_no_pretrained_record_falls_back_to_random() {
        let (_tmp, store, _) = store_with("ast");
        let device = Default::default();
        let cfg    = AudioEncoderConfig::new(EncoderConfig::new(8, 1, 2, 16), 5, 4);
        let enc    = store.load_audio_encoder::<TestBackend>("ast", &cfg, &device).unwrap();
        assert_eq!(enc.hidden_size(), 8);
    }
}
