// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses the flags, prints them, fixes seeds and devices, and
// hands the run to Layer 2. A single command: every invocation
// is one training run.
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::TrainArgs;

use crate::application::train_use_case::{TrainConfig, TrainUseCase};
use crate::infra::seed::{configure_devices, seed_everything};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

#[derive(Parser, Debug)]
#[command(
    name = "audio-bert",
    version = "0.1.0",
    about = "Fine-tune a text + audio classifier with LoRA adapters on the language encoder."
)]
pub struct Cli {
    #[command(flatten)]
    pub train: TrainArgs,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config: TrainConfig = self.train.into();

        println!("----args_info----");
        println!("{config:#?}");

        seed_everything::<MyBackend>(config.seed);
        let device = configure_devices(&config.device);

        let summary = TrainUseCase::new(config).execute(&device)?;
        tracing::info!(
            "Best dev accuracy {:.4} at epoch {:?}",
            summary.best_accuracy, summary.best_epoch,
        );
        Ok(())
    }
}
