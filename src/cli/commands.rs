// ============================================================
// Layer 1 - CLI Arguments
// ============================================================
// Every flag of a training run. Long names keep their
// snake_case spelling (--batch_size, --data_path, ...), so
// each one is named explicitly instead of letting clap
// kebab-case the field.
//
// Nothing is validated beyond type coercion here; the bias
// mode is checked when the run starts.

use clap::Args;
use crate::application::train_use_case::TrainConfig;

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Number of passes over the training split
    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    #[arg(long = "batch_size", default_value_t = 8)]
    pub batch_size: usize,

    /// Peak learning rate of the warmup-cosine schedule
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Exported as CUDA_VISIBLE_DEVICES; "cpu" forces the CPU adapter,
    /// anything else runs on the default adapter
    #[arg(long, default_value = "0")]
    pub device: String,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Directory holding the split CSVs and the audio files
    #[arg(long = "data_path", default_value = "./")]
    pub data_path: String,

    /// Where weights, metrics and run files are written
    #[arg(long = "output_path", default_value = "./outputs")]
    pub output_path: String,

    #[arg(long = "language_model_name", default_value = "google-bert/bert-base-uncased")]
    pub language_model_name: String,

    #[arg(long = "audio_model_name", default_value = "MIT/ast-finetuned-audioset-10-10-0.4593")]
    pub audio_model_name: String,

    /// Prefix of the checkpoint file name. Adapters are written as
    /// safetensors: weights/<save_model_name>_<seed>_LORA.safetensors
    #[arg(long = "save_model_name", default_value = "audio-bert")]
    pub save_model_name: String,

    #[arg(long = "train_file", default_value = "train.csv")]
    pub train_file: String,

    #[arg(long = "dev_file", default_value = "dev.csv")]
    pub dev_file: String,

    /// Root under which model names are resolved
    #[arg(long = "models_dir", default_value = "./models")]
    pub models_dir: String,

    /// Tokens per text after truncation / padding
    #[arg(long = "max_seq_len", default_value_t = 128)]
    pub max_seq_len: usize,

    #[arg(long = "lora_rank", default_value_t = 8)]
    pub lora_rank: usize,

    #[arg(long = "lora_alpha", default_value_t = 16.0)]
    pub lora_alpha: f64,

    #[arg(long = "lora_dropout", default_value_t = 0.1)]
    pub lora_dropout: f64,

    /// Which parameters go into the checkpoint: none, all, LoRA, AdaLoRA, IA3
    #[arg(long = "lora_bias", default_value = "LoRA")]
    pub lora_bias: String,

    #[arg(long = "weight_decay", default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Loader threads for the dev split; the shuffled train split always
    /// loads on one thread so the seed fixes its batch order
    #[arg(long = "num_workers", default_value_t = 1)]
    pub num_workers: usize,
}

/// Layer 1 -> Layer 2 boundary: the application never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            epochs:              a.epochs,
            batch_size:          a.batch_size,
            lr:                  a.lr,
            device:              a.device,
            seed:                a.seed,
            data_path:           a.data_path,
            output_path:         a.output_path,
            language_model_name: a.language_model_name,
            audio_model_name:    a.audio_model_name,
            save_model_name:     a.save_model_name,
            train_file:          a.train_file,
            dev_file:            a.dev_file,
            models_dir:          a.models_dir,
            max_seq_len:         a.max_seq_len,
            lora_rank:           a.lora_rank,
            lora_alpha:          a.lora_alpha,
            lora_dropout:        a.lora_dropout,
            lora_bias:           a.lora_bias,
            weight_decay:        a.weight_decay,
            num_workers:         a.num_workers,
        }
    }
}
