// ============================================================
// Layer 4 - Audio Feature Extraction
// ============================================================
// Turns a WAV file into the fixed-size log-mel matrix the audio
// encoder consumes:
//
//   WAV (any rate, mono/stereo, int/float PCM)
//       │  hound
//       ▼
//   mono f32 samples in [-1, 1]
//       │  rubato (only if the rate differs)
//       ▼
//   samples at `sampling_rate`
//       │  rustfft (window zero-padded to a power of two),
//       │  Hann window, triangular mel filters
//       ▼
//   log-mel [frames, num_mel_bins]
//       │  zero-pad / truncate to `max_length` frames
//       ▼
//   (x - mean) / (2 * std)
//
// The layout is frame-major so one row is one time step; the
// encoder projects each row to the hidden size.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::domain::record::DataError;

/// Clips shorter than this produce no meaningful frame.
pub const MIN_AUDIO_MS: u64 = 25;

/// Settings read from a model directory's `preprocessor_config.json`.
/// Field names follow the AST feature extractor so that file can be
/// dropped in as-is; anything absent takes the AudioSet defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractorConfig {
    pub sampling_rate: u32,
    pub num_mel_bins:  usize,
    /// Frames per clip after pad / truncate
    pub max_length:    usize,
    /// Window length in samples (25 ms at 16 kHz)
    pub n_fft:         usize,
    /// Hop in samples (10 ms at 16 kHz)
    pub hop_length:    usize,
    pub do_normalize:  bool,
    pub mean:          f32,
    pub std:           f32,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 16_000,
            num_mel_bins:  128,
            max_length:    1024,
            n_fft:         400,
            hop_length:    160,
            do_normalize:  true,
            mean:          -4.267_739_3,
            std:           4.568_997_4,
        }
    }
}

// ─── AudioFeatureExtractor ────────────────────────────────────────────────────
/// Caches the FFT plan, window and filterbank across clips.
pub struct AudioFeatureExtractor {
    fft:         Arc<dyn rustfft::Fft<f32>>,
    window:      Vec<f32>,
    mel_filters: Vec<f32>,
    fft_size:    usize,
    n_freqs:     usize,
    config:      FeatureExtractorConfig,
}

impl AudioFeatureExtractor {
    pub fn new(config: FeatureExtractorConfig) -> Self {
        let n_fft    = config.n_fft;
        let fft_size = n_fft.next_power_of_two();
        let n_freqs  = fft_size / 2 + 1;
        let fft      = FftPlanner::new().plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..n_fft)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n_fft - 1) as f32).cos())
            })
            .collect();

        let mel_filters = mel_filterbank(config.sampling_rate, fft_size, config.num_mel_bins);

        Self { fft, window, mel_filters, fft_size, n_freqs, config }
    }

    pub fn config(&self) -> &FeatureExtractorConfig {
        &self.config
    }

    /// Load, resample and featurise one clip.
    /// Returns `max_length * num_mel_bins` values, frame-major.
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<Vec<f32>> {
        let path = path.as_ref();
        let (samples, rate) = load_wav(path)?;
        let samples = resample(&samples, rate, self.config.sampling_rate)
            .with_context(|| format!("Cannot resample '{}'", path.display()))?;
        Ok(self.extract(&samples))
    }

    /// Featurise samples already at `sampling_rate`.
    pub fn extract(&self, samples: &[f32]) -> Vec<f32> {
        let mel = self.log_mel(samples);
        self.pad_and_normalize(mel)
    }

    fn log_mel(&self, samples: &[f32]) -> Vec<f32> {
        let n_fft   = self.config.n_fft;
        let hop     = self.config.hop_length;
        let n_mels  = self.config.num_mel_bins;
        // Never featurise more audio than will survive truncation
        let keep    = (self.config.max_length * hop).min(samples.len());
        let audio   = &samples[..keep];
        let frames  = (audio.len() / hop).max(1);

        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.fft_size];
        let mut mel    = vec![0.0f32; frames * n_mels];

        for frame in 0..frames {
            let start = frame * hop;
            buffer.fill(Complex::new(0.0, 0.0));
            for (i, slot) in buffer[..n_fft].iter_mut().enumerate() {
                let s = audio.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(s * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer);

            for m in 0..n_mels {
                let filter = &self.mel_filters[m * self.n_freqs..(m + 1) * self.n_freqs];
                let energy: f32 = buffer[..self.n_freqs]
                    .iter()
                    .zip(filter)
                    .map(|(c, w)| (c.re * c.re + c.im * c.im) * w)
                    .sum();
                mel[frame * n_mels + m] = energy.max(1e-10).ln();
            }
        }
        mel
    }

    fn pad_and_normalize(&self, mut mel: Vec<f32>) -> Vec<f32> {
        let target = self.config.max_length * self.config.num_mel_bins;
        mel.resize(target, 0.0);

        if self.config.do_normalize {
            let scale = 2.0 * self.config.std;
            for v in &mut mel {
                *v = (*v - self.config.mean) / scale;
            }
        }
        mel
    }
}

// ─── WAV I/O ──────────────────────────────────────────────────────────────────
/// Decode a WAV file to mono samples in [-1, 1] and its sample rate.
pub fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let audio_err = |reason: String| DataError::Audio {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = hound::WavReader::open(path)
        .map_err(|e| audio_err(format!("cannot read WAV: {e}")))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(audio_err("sample rate is 0".into()).into());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| audio_err(e.to_string()))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| audio_err(e.to_string()))?,
    };

    let channels = spec.channels.max(1) as usize;
    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
            .collect()
    };

    let duration_ms = samples.len() as u64 * 1000 / spec.sample_rate as u64;
    if duration_ms < MIN_AUDIO_MS {
        return Err(audio_err(format!("clip is {duration_ms} ms, need at least {MIN_AUDIO_MS} ms")).into());
    }

    Ok((samples, spec.sample_rate))
}

/// FFT-based resampling; a no-op when the rates already match.
/// Output is aligned with the input: the resampler's delay is dropped
/// from the front and zero chunks flush the tail.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    use rubato::{FftFixedInOut, Resampler};

    let mut resampler = FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, 1024, 1)
        .map_err(|e| anyhow::anyhow!("resampler init failed: {e}"))?;
    let chunk    = resampler.input_frames_max();
    let delay    = resampler.output_delay();
    let expected = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;

    let mut output = Vec::with_capacity(delay + expected + resampler.output_frames_max());
    let mut offset = 0;
    while output.len() < delay + expected {
        let end = (offset + chunk).min(samples.len());
        let mut padded = samples.get(offset..end).unwrap_or_default().to_vec();
        padded.resize(chunk, 0.0);
        let out = resampler
            .process(&[padded], None)
            .map_err(|e| anyhow::anyhow!("resampling failed: {e}"))?;
        output.extend_from_slice(&out[0]);
        offset += chunk;
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

/// Triangular filters on the HTK mel scale, row-major [n_mels, fft_size/2 + 1].
///
/// Weights come from each FFT bin's continuous mel position. A filter
/// narrower than the bin spacing (low frequencies, many mel bins) would
/// still cover no bin centre, so it takes the bin nearest its centre and
/// no output column is constant.
fn mel_filterbank(sample_rate: u32, fft_size: usize, n_mels: usize) -> Vec<f32> {
    let n_freqs   = fft_size / 2 + 1;
    let bin_hz    = sample_rate as f32 / fft_size as f32;
    let hz_to_mel = |hz: f32| 2595.0 * (1.0 + hz / 700.0).log10();
    let mel_to_hz = |mel: f32| 700.0 * (10.0f32.powf(mel / 2595.0) - 1.0);

    let mel_hi = hz_to_mel(sample_rate as f32 / 2.0);
    let edges: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_hi * i as f32 / (n_mels + 1) as f32)
        .collect();
    let bin_mel: Vec<f32> = (0..n_freqs).map(|k| hz_to_mel(k as f32 * bin_hz)).collect();

    let mut bank = vec![0.0f32; n_mels * n_freqs];
    for (m, row) in bank.chunks_exact_mut(n_freqs).enumerate() {
        let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
        for (w, &mel) in row.iter_mut().zip(&bin_mel) {
            let rising  = (mel - left) / (center - left);
            let falling = (right - mel) / (right - center);
            *w = rising.min(falling).max(0.0);
        }
        if row.iter().all(|&w| w == 0.0) {
            let nearest = (mel_to_hz(center) / bin_hz).round() as usize;
            row[nearest.min(n_freqs - 1)] = 1.0;
        }
    }
    bank
}
