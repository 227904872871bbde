use anyhow::Result;
use burn::{
    nn::{
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::data::batcher::AudioTextBatch;
use crate::ml::encoder::{mask_bias, EncoderConfig, EncoderLayer};
use crate::ml::lora::LoraConfig;
use crate::ml::state_dict::{NamedParams, StateDict};

// ─── Text encoder ─────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct TextEncoderConfig {
    pub encoder:                 EncoderConfig,
    pub vocab_size:              usize,
    pub max_position_embeddings: usize,
}

impl TextEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TextEncoder<B> {
        let d = self.encoder.hidden_size;
        TextEncoder {
            word_embeddings:     EmbeddingConfig::new(self.vocab_size, d).init(device),
            position_embeddings: EmbeddingConfig::new(self.max_position_embeddings, d).init(device),
            embedding_norm:      LayerNormConfig::new(d)
                .with_epsilon(self.encoder.layer_norm_eps)
                .init(device),
            layers:              self.encoder.init_layers(device),
            dropout:             DropoutConfig::new(self.encoder.dropout).init(),
        }
    }
}

/// BERT-style encoder; the pooled output is the hidden state at [CLS].
#[derive(Module, Debug)]
pub struct TextEncoder<B: Backend> {
    pub word_embeddings:     Embedding<B>,
    pub position_embeddings: Embedding<B>,
    pub embedding_norm:      LayerNorm<B>,
    pub layers:              Vec<EncoderLayer<B>>,
    pub dropout:             Dropout,
}

impl<B: Backend> TextEncoder<B> {
    /// input_ids, attention_mask: [batch, seq] -> [batch, hidden]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch, seq] = input_ids.dims();
        let device = input_ids.device();

        let positions = Tensor::<B, 1, Int>::arange(0..seq as i64, &device)
            .unsqueeze::<2>()
            .expand([batch, seq]);
        let x = self.word_embeddings.forward(input_ids) + self.position_embeddings.forward(positions);
        let mut x = self.dropout.forward(self.embedding_norm.forward(x));

        let bias = mask_bias(attention_mask);
        for layer in &self.layers {
            x = layer.forward(x, Some(bias.clone()));
        }

        let [_, _, hidden] = x.dims();
        x.slice([0..batch, 0..1, 0..hidden]).reshape([batch, hidden])
    }

    /// Freeze the whole encoder and add adapters to every attention block.
    pub fn attach_lora(self, cfg: &LoraConfig, device: &B::Device) -> Self {
        Self {
            word_embeddings:     self.word_embeddings.no_grad(),
            position_embeddings: self.position_embeddings.no_grad(),
            embedding_norm:      self.embedding_norm.no_grad(),
            layers:              self
                .layers
                .into_iter()
                .map(|l| l.attach_lora(cfg, device))
                .collect(),
            dropout:             self.dropout,
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.word_embeddings.weight.dims()[1]
    }
}

// ─── Audio encoder ────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct AudioEncoderConfig {
    pub encoder:      EncoderConfig,
    pub num_mel_bins: usize,
    pub max_frames:   usize,
}

impl AudioEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AudioEncoder<B> {
        let d = self.encoder.hidden_size;
        AudioEncoder {
            frame_projection:    LinearConfig::new(self.num_mel_bins, d).init(device),
            position_embeddings: EmbeddingConfig::new(self.max_frames, d).init(device),
            embedding_norm:      LayerNormConfig::new(d)
                .with_epsilon(self.encoder.layer_norm_eps)
                .init(device),
            layers:              self.encoder.init_layers(device),
            dropout:             DropoutConfig::new(self.encoder.dropout).init(),
        }
    }
}

/// Transformer over log-mel frames, mean-pooled over time.
#[derive(Module, Debug)]
pub struct AudioEncoder<B: Backend> {
    pub frame_projection:    Linear<B>,
    pub position_embeddings: Embedding<B>,
    pub embedding_norm:      LayerNorm<B>,
    pub layers:              Vec<EncoderLayer<B>>,
    pub dropout:             Dropout,
}

impl<B: Backend> AudioEncoder<B> {
    /// features: [batch, frames, mel] -> [batch, hidden]
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, frames, _] = features.dims();
        let device = features.device();

        let positions = Tensor::<B, 1, Int>::arange(0..frames as i64, &device)
            .unsqueeze::<2>()
            .expand([batch, frames]);
        let x = self.frame_projection.forward(features) + self.position_embeddings.forward(positions);
        let mut x = self.dropout.forward(self.embedding_norm.forward(x));

        for layer in &self.layers {
            x = layer.forward(x, None);
        }

        let [_, _, hidden] = x.dims();
        x.mean_dim(1).reshape([batch, hidden])
    }

    pub fn hidden_size(&self) -> usize {
        self.frame_projection.weight.dims()[1]
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct AudioTextClassifierConfig {
    pub text:        TextEncoderConfig,
    pub audio:       AudioEncoderConfig,
    pub num_classes: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl AudioTextClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AudioTextClassifier<B> {
        let language_enc = self.text.init(device);
        let audio_enc    = self.audio.init(device);
        self.assemble(language_enc, audio_enc, device)
    }

    /// Build the fusion head around existing (possibly pretrained) encoders.
    pub fn assemble<B: Backend>(
        &self,
        language_enc: TextEncoder<B>,
        audio_enc:    AudioEncoder<B>,
        device:       &B::Device,
    ) -> AudioTextClassifier<B> {
        let d_text  = language_enc.hidden_size();
        let d_audio = audio_enc.hidden_size();
        AudioTextClassifier {
            language_enc,
            audio_enc,
            fusion:     LinearConfig::new(d_text + d_audio, d_text).init(device),
            classifier: LinearConfig::new(d_text, self.num_classes).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct AudioTextClassifier<B: Backend> {
    pub language_enc: TextEncoder<B>,
    pub audio_enc:    AudioEncoder<B>,
    pub fusion:       Linear<B>,
    pub classifier:   Linear<B>,
    pub dropout:      Dropout,
}

pub struct ClassifierOutput<B: Backend> {
    /// Mean cross-entropy over the batch, shape [1]
    pub loss:    Tensor<B, 1>,
    pub logits:  Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassifierOutput<B> {
    /// Number of rows whose argmax matches the target.
    pub fn correct(&self) -> usize {
        let pred = self.logits.clone().argmax(1).flatten::<1>(0, 1);
        pred.equal(self.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize
    }
}

impl<B: Backend> AudioTextClassifier<B> {
    /// Adapters on the language encoder, everything pretrained frozen.
    /// Only adapters, the fusion layer and the classifier stay trainable.
    pub fn prepare_finetuning(self, lora: &LoraConfig, device: &B::Device) -> Self {
        Self {
            language_enc: self.language_enc.attach_lora(lora, device),
            audio_enc:    self.audio_enc.no_grad(),
            ..self
        }
    }

    /// -> logits [batch, num_classes]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        audio_features: Tensor<B, 3>,
    ) -> Tensor<B, 2> {
        let text  = self.language_enc.forward(input_ids, attention_mask);
        let audio = self.audio_enc.forward(audio_features);

        let fused = Tensor::cat(vec![text, audio], 1);
        let fused = activation::gelu(self.fusion.forward(fused));
        self.classifier.forward(self.dropout.forward(fused))
    }

    /// Named parameters of the language encoder, adapters included.
    pub fn language_state_dict(&self) -> Result<StateDict> {
        self.language_enc.state_dict()
    }

    pub fn forward_classification(&self, batch: AudioTextBatch<B>) -> ClassifierOutput<B> {
        let logits = self.forward(batch.input_ids, batch.attention_mask, batch.audio_features);
        let loss   = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.labels.clone());
        ClassifierOutput { loss, logits, targets: batch.labels }
    }
}
