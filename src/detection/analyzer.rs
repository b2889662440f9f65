//! # Prosodic Pulse Tracking
//!
//! Ties decoding, onset extraction and classification together for one staged file.
//! Everything here is synchronous and CPU bound; the HTTP handler runs it on the
//! blocking pool.

use crate::audio::{decode_mono, onset_strength, variance, OnsetParams};
use crate::config::{AnalysisConfig, AppConfig, DetectionConfig};
use crate::detection::classifier::{ClassificationResult, PulseClassifier};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// The statistic PPT is based on, plus what it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseMeasurement {
    pub variance: f64,
    pub frames: usize,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// Analyzer shared by all request handlers; holds only immutable parameters.
#[derive(Debug, Clone)]
pub struct PulseAnalyzer {
    classifier: PulseClassifier,
    params: OnsetParams,
}

impl PulseAnalyzer {
    pub fn new(detection: &DetectionConfig, analysis: &AnalysisConfig) -> Self {
        Self {
            classifier: PulseClassifier::new(detection.clone()),
            params: OnsetParams::from(analysis),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.detection, &config.analysis)
    }

    /// Decode the file and measure the variance of its onset-strength envelope.
    pub fn measure(&self, path: &Path) -> Result<PulseMeasurement> {
        let audio = decode_mono(path).context("Failed to load audio")?;
        let envelope = onset_strength(&audio.samples, audio.sample_rate, &self.params)
            .context("Failed to extract onset strength")?;

        let variance = variance(&envelope).ok_or_else(|| anyhow!("Onset envelope is empty"))?;
        if !variance.is_finite() {
            return Err(anyhow!("Onset envelope variance is not finite"));
        }

        Ok(PulseMeasurement {
            variance,
            frames: envelope.len(),
            sample_rate: audio.sample_rate,
            duration_secs: audio.duration_secs(),
        })
    }

    /// Classify a staged clip. Never fails: problems become an ERROR result.
    pub fn analyze(&self, path: &Path) -> ClassificationResult {
        let started = Instant::now();

        match self.measure(path) {
            Ok(measurement) => {
                let result = self.classifier.classify(measurement.variance);
                debug!(
                    variance = measurement.variance,
                    frames = measurement.frames,
                    sample_rate = measurement.sample_rate,
                    duration_secs = measurement.duration_secs,
                    classification = %result.classification,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Pulse analysis complete"
                );
                result
            }
            Err(err) => {
                warn!(error = %format!("{:#}", err), "Pulse analysis failed");
                ClassificationResult::error(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::classifier::Classification;

    fn write_wav(path: &Path, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn analyzer() -> PulseAnalyzer {
        PulseAnalyzer::from_config(&AppConfig::default())
    }

    #[test]
    fn test_silence_is_ai_generated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_wav(&path, &vec![0.0; 32000]);

        let measurement = analyzer().measure(&path).unwrap();
        assert_eq!(measurement.variance, 0.0);
        assert_eq!(measurement.sample_rate, 16000);
        assert_eq!(measurement.frames, 1 + 32000 / 512);

        let result = analyzer().analyze(&path);
        assert_eq!(result.classification, Classification::AiGenerated);
        assert_eq!(result.score, 0.96);
    }

    #[test]
    fn test_clicks_are_human() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clicks.wav");
        let samples: Vec<f32> = (0..48000)
            .map(|i| if i % 4000 == 2000 { 0.9 } else { 0.0 })
            .collect();
        write_wav(&path, &samples);

        let result = analyzer().analyze(&path);
        assert_eq!(result.classification, Classification::Human);
        assert_eq!(result.score, 0.98);
    }

    #[test]
    fn test_unreadable_file_becomes_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio_broken.mp3");
        std::fs::write(&path, b"not audio at all").unwrap();

        let result = analyzer().analyze(&path);
        assert!(result.is_error());
        assert_eq!(result.score, 0.0);
        assert!(result.explanation.starts_with("Analysis Error: Failed to load audio"));
    }
}
