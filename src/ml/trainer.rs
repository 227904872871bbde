// ============================================================
// Layer 5 - Burn Epoch Runner
// ============================================================
// The backend half of the training loop. The application layer
// owns the epoch sequence; this file does one epoch's worth of
// tensor work at a time through the EpochRunner trait.
//
//   train_epoch  - autodiff backend, AdamW step per batch at the
//                  scheduled learning rate
//   validate     - model.valid() on the inner backend: no graph,
//                  no dropout, no updates
//   save_checkpoint
//                - language encoder state -> adapter filter ->
//                  safetensors
//
// Validation batches are built on B::InnerBackend so they match
// the module returned by valid().
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use burn::{
    data::{dataloader::{DataLoader, DataLoaderBuilder}, dataset::Dataset},
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    audio::FeatureExtractorConfig,
    batcher::{AudioTextBatch, AudioTextBatcher},
    dataset::AudioTextDataset,
};
use crate::domain::{
    adapter_filter::{peft_state_dict, BiasMode},
    epoch::EpochStats,
    traits::EpochRunner,
};
use crate::infra::{checkpoint::CheckpointManager, model_store::ModelStore};
use crate::ml::{
    model::{AudioTextClassifier, AudioTextClassifierConfig},
    optim::{adamw, OptimizationPlan},
    scheduler::CosineWarmupSchedule,
};

pub type BatchLoader<B> = Arc<dyn DataLoader<AudioTextBatch<B>>>;

// ─── Model construction ───────────────────────────────────────────────────────

/// Pretrained (or random) encoders, a fresh fusion head, adapters on the
/// language encoder and everything else frozen.
pub fn build_classifier<B: Backend>(
    cfg:         &TrainConfig,
    store:       &ModelStore,
    features:    &FeatureExtractorConfig,
    num_classes: usize,
    device:      &B::Device,
) -> Result<AudioTextClassifier<B>> {
    let text_cfg  = store.text_encoder_config(&cfg.language_model_name, cfg.max_seq_len)?;
    let audio_cfg = store.audio_encoder_config(&cfg.audio_model_name, features)?;

    let language_enc = store.load_text_encoder::<B>(&cfg.language_model_name, &text_cfg, device)?;
    let audio_enc    = store.load_audio_encoder::<B>(&cfg.audio_model_name, &audio_cfg, device)?;

    let model = AudioTextClassifierConfig::new(text_cfg, audio_cfg, num_classes)
        .assemble(language_enc, audio_enc, device)
        .prepare_finetuning(&cfg.lora(), device);

    let adapted = model
        .language_enc
        .layers
        .iter()
        .flat_map(|l| [&l.attention.query, &l.attention.value])
        .filter(|p| p.has_adapter())
        .count();
    tracing::info!(
        "Model ready: {} classes, {} text layers, {} audio layers, LoRA rank {} on {} projections",
        num_classes,
        model.language_enc.layers.len(),
        model.audio_enc.layers.len(),
        cfg.lora_rank,
        adapted,
    );
    Ok(model)
}

// ─── Loaders ──────────────────────────────────────────────────────────────────

/// Shuffled with the run seed on a single worker: burn's multi-worker
/// loader yields batches in completion order, which would break the
/// seed -> batch order guarantee.
pub fn train_loader<B: Backend>(
    dataset: AudioTextDataset,
    cfg:     &TrainConfig,
    device:  &B::Device,
) -> BatchLoader<B> {
    if cfg.num_workers > 1 {
        tracing::debug!("Train loader uses 1 worker to keep batch order seeded");
    }
    DataLoaderBuilder::new(AudioTextBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(dataset)
}

/// Order does not matter for evaluation, so `num_workers` applies here.
pub fn eval_loader<B: Backend>(
    dataset: AudioTextDataset,
    cfg:     &TrainConfig,
    device:  &B::Device,
) -> BatchLoader<B> {
    DataLoaderBuilder::new(AudioTextBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers.max(1))
        .build(dataset)
}

// ─── BurnEpochRunner ──────────────────────────────────────────────────────────

pub struct BurnEpochRunner<B: AutodiffBackend, O> {
    model:        AudioTextClassifier<B>,
    optim:        O,
    schedule:     CosineWarmupSchedule,
    train_loader: BatchLoader<B>,
    dev_loader:   BatchLoader<B::InnerBackend>,
    checkpoints:  CheckpointManager,
    bias_mode:    BiasMode,
}

/// Wire loaders, step plan, schedule and AdamW around `model`.
/// Fails with `ScheduleError::NoSteps` if the run would never step.
pub fn build_runner<B: AutodiffBackend>(
    model:       AudioTextClassifier<B>,
    train:       AudioTextDataset,
    dev:         AudioTextDataset,
    cfg:         &TrainConfig,
    checkpoints: CheckpointManager,
    bias_mode:   BiasMode,
    device:      &B::Device,
) -> Result<BurnEpochRunner<B, impl Optimizer<AudioTextClassifier<B>, B>>> {
    let batches_per_epoch = train.len().div_ceil(cfg.batch_size.max(1));
    let plan = OptimizationPlan::new(batches_per_epoch, cfg.epochs)?;
    tracing::info!(
        "{} steps ({} per epoch), {} warmup",
        plan.total_steps, batches_per_epoch, plan.warmup_steps,
    );

    Ok(BurnEpochRunner {
        model,
        optim:        adamw::<B, AudioTextClassifier<B>>(cfg.weight_decay),
        schedule:     plan.schedule(cfg.lr),
        train_loader: train_loader::<B>(train, cfg, device),
        dev_loader:   eval_loader::<B::InnerBackend>(dev, cfg, device),
        checkpoints,
        bias_mode,
    })
}

impl<B, O> BurnEpochRunner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AudioTextClassifier<B>, B>,
{
    pub fn model(&self) -> &AudioTextClassifier<B> {
        &self.model
    }
}

impl<B, O> EpochRunner for BurnEpochRunner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AudioTextClassifier<B>, B>,
{
    fn train_epoch(&mut self, epoch: usize) -> Result<EpochStats> {
        let mut loss_sum = 0.0f64;
        let mut correct  = 0usize;
        let mut batches  = 0usize;
        let mut samples  = 0usize;

        for batch in self.train_loader.iter() {
            let output = self.model.forward_classification(batch);

            loss_sum += output.loss.clone().into_scalar().elem::<f64>();
            correct  += output.correct();
            samples  += output.targets.dims()[0];
            batches  += 1;

            let lr    = self.schedule.next_lr();
            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self.optim.step(lr, self.model.clone(), grads);
        }

        let stats = EpochStats::from_totals(loss_sum, correct, batches, samples);
        tracing::debug!("epoch {epoch}: {batches} train batches, step {}", self.schedule.step());
        Ok(stats)
    }

    fn validate(&mut self) -> Result<EpochStats> {
        let model = self.model.valid();

        let mut loss_sum = 0.0f64;
        let mut correct  = 0usize;
        let mut batches  = 0usize;
        let mut samples  = 0usize;

        for batch in self.dev_loader.iter() {
            let output = model.forward_classification(batch);
            loss_sum += output.loss.clone().into_scalar().elem::<f64>();
            correct  += output.correct();
            samples  += output.targets.dims()[0];
            batches  += 1;
        }

        Ok(EpochStats::from_totals(loss_sum, correct, batches, samples))
    }

    fn save_checkpoint(&self) -> Result<PathBuf> {
        let state   = self.model.language_state_dict()?;
        let adapter = peft_state_dict(&state, self.bias_mode);
        self.checkpoints.save_adapters(&adapter)
    }

    fn current_lr(&self) -> f64 {
        self.schedule.current()
    }
}
