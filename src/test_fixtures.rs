//! Shared helpers for unit tests: tiny WAV clips, a word-level tokenizer
//! and synthetic samples small enough to train on the CPU backend.

use std::path::Path;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::dataset::AudioTextSample;

pub fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[f32]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        for _ in 0..channels {
            w.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
    }
    w.finalize().unwrap();
}

pub fn sine(rate: u32, hz: f32, seconds: f32) -> Vec<f32> {
    let n = (rate as f32 * seconds) as usize;
    (0..n)
        .map(|i| (2.0 * std::f32::consts::PI * hz * i as f32 / rate as f32).sin() * 0.5)
        .collect()
}

/// Writes `tokenizer.json` for a WordLevel model over `words`, with
/// BERT-style special token ids and a `[CLS] $A [SEP]` template.
pub fn write_tokenizer(dir: &Path, words: &[&str]) {
    let mut vocab = serde_json::json!({
        "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
    });
    for (i, w) in words.iter().enumerate() {
        vocab[*w] = serde_json::json!(4 + i);
    }
    let special = |id: u32, content: &str| {
        serde_json::json!({
            "id": id, "content": content, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        })
    };
    let tokenizer = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [special(0, "[PAD]"), special(1, "[UNK]"), special(2, "[CLS]"), special(3, "[SEP]")],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } }
            ],
            "pair": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } },
                { "Sequence": { "id": "B", "type_id": 1 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 1 } }
            ],
            "special_tokens": {
                "[CLS]": { "id": "[CLS]", "ids": [2], "tokens": ["[CLS]"] },
                "[SEP]": { "id": "[SEP]", "ids": [3], "tokens": ["[SEP]"] }
            }
        },
        "decoder": null,
        "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
    });
    std::fs::write(
        dir.join("tokenizer.json"),
        serde_json::to_string_pretty(&tokenizer).unwrap(),
    )
    .unwrap();
}

/// `count` random samples with labels cycling through `num_classes`.
pub fn synthetic_samples(
    count:       usize,
    seq_len:     usize,
    frames:      usize,
    mel_bins:    usize,
    num_classes: usize,
    seed:        u64,
) -> Vec<AudioTextSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let real = rng.gen_range(2..=seq_len);
            let mut input_ids: Vec<u32> = (0..real).map(|_| rng.gen_range(4..20)).collect();
            input_ids.resize(seq_len, 0);
            let mut attention_mask = vec![1u32; real];
            attention_mask.resize(seq_len, 0);
            AudioTextSample {
                input_ids,
                attention_mask,
                audio_features: (0..frames * mel_bins).map(|_| rng.gen_range(-1.0..1.0)).collect(),
                num_frames: frames,
                num_mel_bins: mel_bins,
                label: i % num_classes,
            }
        })
        .collect()
}
