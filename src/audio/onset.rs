//! # Onset Strength
//!
//! Computes an onset-strength envelope: a per-frame estimate of how strongly a
//! new sound event begins, derived from positive changes in log-mel energy.
//!
//! ## Steps:
//! 1. Centered STFT with a periodic Hann window (zero padding of `n_fft / 2` on both sides)
//! 2. Power spectrum projected onto a Slaney-style mel filterbank
//! 3. Power to decibels, floored at `max - top_db`
//! 4. Spectral flux with lag 1, rectified and averaged across mel bands
//! 5. Left-padded by `1 + n_fft / (2 * hop_length)` zeros so frames line up with STFT centres
//!
//! The envelope has exactly one value per STFT frame (`1 + len / hop_length`).

use crate::config::AnalysisConfig;
use anyhow::{anyhow, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

/// Power floor applied before taking logarithms.
const AMIN: f32 = 1e-10;

/// Frame offset used for spectral flux.
const LAG: usize = 1;

/// Parameters of the onset-strength computation.
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub top_db: f32,
}

impl Default for OnsetParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: 80.0,
        }
    }
}

impl From<&AnalysisConfig> for OnsetParams {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            n_mels: config.n_mels,
            top_db: config.top_db,
        }
    }
}

/// One triangular mel filter, stored as the contiguous run of non-zero weights.
struct MelFilter {
    first_bin: usize,
    weights: Vec<f32>,
}

/// Compute the onset-strength envelope of a mono waveform.
pub fn onset_strength(samples: &[f32], sample_rate: u32, params: &OnsetParams) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Err(anyhow!("Cannot compute onset strength of an empty signal"));
    }
    if sample_rate == 0 {
        return Err(anyhow!("Sample rate must be greater than 0"));
    }
    if params.n_fft == 0 || params.hop_length == 0 || params.n_mels == 0 {
        return Err(anyhow!("n_fft, hop_length and n_mels must be greater than 0"));
    }

    let power = stft_power(samples, params.n_fft, params.hop_length);
    let filters = mel_filterbank(sample_rate, params.n_fft, params.n_mels);

    // Log-mel spectrogram, frame-major: mel_db[frame][band]
    let mut mel_db: Vec<Vec<f32>> = power
        .iter()
        .map(|spectrum| {
            filters
                .iter()
                .map(|filter| {
                    let energy: f32 = filter
                        .weights
                        .iter()
                        .zip(&spectrum[filter.first_bin..])
                        .map(|(w, p)| w * p)
                        .sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect()
        })
        .collect();

    let peak = mel_db
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - params.top_db;
    for value in mel_db.iter_mut().flat_map(|frame| frame.iter_mut()) {
        *value = value.max(floor);
    }

    let n_frames = mel_db.len();
    let pad = LAG + params.n_fft / (2 * params.hop_length);

    let mut envelope = vec![0.0f32; pad];
    envelope.extend((LAG..n_frames).map(|t| {
        let rising: f32 = mel_db[t]
            .iter()
            .zip(&mel_db[t - LAG])
            .map(|(current, previous)| (current - previous).max(0.0))
            .sum();
        rising / params.n_mels as f32
    }));
    envelope.truncate(n_frames);

    Ok(envelope)
}

/// Population variance (divides by `n`). `None` for an empty slice.
pub fn variance(values: &[f32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let sum_sq = values
        .iter()
        .map(|&v| {
            let diff = v as f64 - mean;
            diff * diff
        })
        .sum::<f64>();

    Some(sum_sq / n)
}

/// Power spectrogram, frame-major: `power[frame][bin]` with `1 + n_fft / 2` bins.
fn stft_power(samples: &[f32], n_fft: usize, hop_length: usize) -> Vec<Vec<f32>> {
    let half = n_fft / 2;
    let mut padded = vec![0.0f32; half];
    padded.extend_from_slice(samples);
    padded.extend(std::iter::repeat(0.0).take(half));

    if padded.len() < n_fft {
        padded.resize(n_fft, 0.0);
    }
    let n_frames = 1 + (padded.len() - n_fft) / hop_length;
    let n_bins = 1 + n_fft / 2;

    // Periodic Hann window
    let window: Vec<f32> = (0..n_fft)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / n_fft as f32).cos())
        .collect();

    let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0f32); n_fft];

    (0..n_frames)
        .map(|frame| {
            let start = frame * hop_length;
            for ((slot, &sample), &w) in buffer
                .iter_mut()
                .zip(&padded[start..start + n_fft])
                .zip(&window)
            {
                *slot = Complex::new(sample * w, 0.0);
            }
            fft.process(&mut buffer);
            buffer[..n_bins].iter().map(|c| c.norm_sqr()).collect()
        })
        .collect()
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular filters spanning 0 Hz to Nyquist, each scaled to unit area (Slaney norm).
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<MelFilter> {
    let n_bins = 1 + n_fft / 2;
    let nyquist = sample_rate as f64 / 2.0;
    let bin_hz = sample_rate as f64 / n_fft as f64;

    let mel_max = hz_to_mel(nyquist);
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, centre, right) = (edges[m], edges[m + 1], edges[m + 2]);
            let enorm = 2.0 / (right - left);

            let weights: Vec<f64> = (0..n_bins)
                .map(|bin| {
                    let freq = bin as f64 * bin_hz;
                    let lower = (freq - left) / (centre - left);
                    let upper = (right - freq) / (right - centre);
                    lower.min(upper).max(0.0) * enorm
                })
                .collect();

            let first_bin = weights.iter().position(|&w| w > 0.0).unwrap_or(0);
            let last_bin = weights
                .iter()
                .rposition(|&w| w > 0.0)
                .map_or(first_bin, |idx| idx + 1);

            MelFilter {
                first_bin,
                weights: weights[first_bin..last_bin].iter().map(|&w| w as f32).collect(),
            }
        })
        .collect()
}
