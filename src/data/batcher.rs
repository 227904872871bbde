// ============================================================
// Layer 4 - Audio/Text Batcher
// ============================================================
// Implements Burn's Batcher trait: N samples in, one batch of
// device tensors out.
//
//   input_ids       [N, S]     Int
//   attention_mask  [N, S]     Int   (1 = token, 0 = padding)
//   audio_features  [N, T, M]  Float (frames x mel bins)
//   labels          [N]        Int
//
// Every sample is already padded to the same S and T by the
// featurizer, so batching is flatten + reshape.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::AudioTextSample;

#[derive(Debug, Clone)]
pub struct AudioTextBatch<B: Backend> {
    pub input_ids:      Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub audio_features: Tensor<B, 3>,
    pub labels:         Tensor<B, 1, Int>,
}

/// Holds the target device so tensors land where the model lives.
/// Generic over the backend: the train loader uses the autodiff
/// backend, the validation loader its inner backend.
#[derive(Clone, Debug)]
pub struct AudioTextBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> AudioTextBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<AudioTextSample, AudioTextBatch<B>> for AudioTextBatcher<B> {
    fn batch(&self, items: Vec<AudioTextSample>) -> AudioTextBatch<B> {
        let batch_size = items.len();
        let seq_len    = items[0].input_ids.len();
        let frames     = items[0].num_frames;
        let mel_bins   = items[0].num_mel_bins;

        let ids_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();

        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as i32))
            .collect();

        let audio_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.audio_features.iter().copied())
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        let attention_mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        let audio_features = Tensor::<B, 1>::from_floats(audio_flat.as_slice(), &self.device)
            .reshape([batch_size, frames, mel_bins]);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        AudioTextBatch { input_ids, attention_mask, audio_features, labels }
    }
}
