// ============================================================
// Layer 4 - Featurizer
// ============================================================
// Converts DatasetRecords into AudioTextSamples:
//
//   text       -> tokenizer (with special tokens)
//                 -> truncate / pad to max_seq_len + mask
//   audio_path -> AudioFeatureExtractor -> [frames, mel]
//   label      -> LabelSet index
//
// The tokenizer comes from the language model directory and the
// extractor settings from the audio model directory, so the
// features always match what the pretrained encoders saw.

use anyhow::{Context, Result};
use tokenizers::Tokenizer;

use crate::data::{audio::AudioFeatureExtractor, dataset::AudioTextSample};
use crate::domain::record::{DatasetRecord, LabelSet};

pub struct Featurizer {
    tokenizer:   Tokenizer,
    extractor:   AudioFeatureExtractor,
    labels:      LabelSet,
    max_seq_len: usize,
    pad_id:      u32,
}

impl Featurizer {
    pub fn new(
        tokenizer:   Tokenizer,
        extractor:   AudioFeatureExtractor,
        labels:      LabelSet,
        max_seq_len: usize,
    ) -> Self {
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
        Self { tokenizer, extractor, labels, max_seq_len, pad_id }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Featurise a whole split. Fails on the first bad row.
    pub fn featurize_all(&self, records: &[DatasetRecord]) -> Result<Vec<AudioTextSample>> {
        records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                self.featurize(r)
                    .with_context(|| format!("Cannot featurise row {} ('{}')", i + 1, r.audio_path))
            })
            .collect()
    }

    pub fn featurize(&self, record: &DatasetRecord) -> Result<AudioTextSample> {
        let (input_ids, attention_mask) = self.encode_text(&record.text)?;
        let audio_features = self.extractor.extract_file(&record.audio_path)?;
        let label          = self.labels.index_of(&record.label)?;
        let cfg            = self.extractor.config();

        Ok(AudioTextSample {
            input_ids,
            attention_mask,
            audio_features,
            num_frames:   cfg.max_length,
            num_mel_bins: cfg.num_mel_bins,
            label,
        })
    }

    fn encode_text(&self, text: &str) -> Result<(Vec<u32>, Vec<u32>)> {
        let enc = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let mut ids: Vec<u32> = enc.get_ids().to_vec();
        ids.truncate(self.max_seq_len);

        let mut mask = vec![1u32; ids.len()];
        ids.resize(self.max_seq_len, self.pad_id);
        mask.resize(self.max_seq_len, 0);

        Ok((ids, mask))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::audio::FeatureExtractorConfig;
    use crate::test_fixtures::{sine, write_tokenizer, write_wav};

    fn featurizer(dir: &std::path::Path, max_seq_len: usize) -> Featurizer {
        write_tokenizer(dir, &["a", "dog", "barks", "cat"]);
        let tokenizer = Tokenizer::from_file(dir.join("tokenizer.json")).unwrap();
        let extractor = AudioFeatureExtractor::new(FeatureExtractorConfig {
            num_mel_bins: 8,
            max_length:   10,
            ..FeatureExtractorConfig::default()
        });
        let labels = LabelSet::from_records(&[
            DatasetRecord::new("", "", "cat"),
            DatasetRecord::new("", "", "dog"),
        ]);
        Featurizer::new(tokenizer, extractor, labels, max_seq_len)
    }

    #[test]
    fn test_text_is_wrapped_and_padded() {
        let dir = tempfile::tempdir().unwrap();
        let f   = featurizer(dir.path(), 8);
        let (ids, mask) = f.encode_text("a dog barks").unwrap();
        // [CLS] a dog barks [SEP] + 3 pad
        assert_eq!(ids, vec![2, 4, 5, 6, 3, 0, 0, 0]);
        assert_eq!(mask, vec![1, 1, 1, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_text_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let f   = featurizer(dir.path(), 3);
        let (ids, mask) = f.encode_text("a dog barks a dog").unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(mask, vec![1, 1, 1]);
    }

    #[test]
    fn test_featurize_record() {
        let dir  = tempfile::tempdir().unwrap();
        let clip = dir.path().join("dog.wav");
        write_wav(&clip, 16_000, 1, &sine(16_000, 300.0, 0.2));

        let f = featurizer(dir.path(), 8);
        let s = f
            .featurize(&DatasetRecord::new("a dog", clip.to_string_lossy(), "dog"))
            .unwrap();

        assert_eq!(s.label, 1);
        assert_eq!(s.attention_mask.iter().filter(|&&m| m == 1).count(), 4);
        assert_eq!(s.audio_features.len(), 10 * 8);
        assert_eq!((s.num_frames, s.num_mel_bins), (10, 8));
    }

    #[test]
    fn test_missing_audio_names_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let f   = featurizer(dir.path(), 8);
        let err = f
            .featurize_all(&[DatasetRecord::new("a", "/no/such.wav", "dog")])
            .unwrap_err();
        assert!(format!("{err:#}").contains("row 1"));
    }
}
