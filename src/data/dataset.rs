use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One featurised example, ready for batching.
/// Text is `[CLS] tokens [SEP] [PAD]...`; audio is frame-major log-mel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTextSample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    /// `num_frames * num_mel_bins` values
    pub audio_features: Vec<f32>,
    pub num_frames:     usize,
    pub num_mel_bins:   usize,
    pub label:          usize,
}

pub struct AudioTextDataset {
    samples: Vec<AudioTextSample>,
}

impl AudioTextDataset {
    pub fn new(samples: Vec<AudioTextSample>) -> Self { Self { samples } }
}

impl Dataset<AudioTextSample> for AudioTextDataset {
    fn get(&self, index: usize) -> Option<AudioTextSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
