//! # Pulse Classifier
//!
//! Maps one scalar (the onset-strength variance) to a label, a confidence
//! score and a canned explanation. Humans tend to have higher rhythmic
//! variance; synthetic voices are often flatter.

use crate::config::DetectionConfig;
use serde::Serialize;
use std::fmt;

pub const HUMAN_EXPLANATION: &str = "Natural prosodic variance and organic speech pulses detected.";
pub const AI_GENERATED_EXPLANATION: &str =
    "Prosodic Pulse Tracking detected synthetic timing resets and mechanical rhythm.";

/// Outcome label of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Human,
    AiGenerated,
    Error,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Human => "HUMAN",
            Classification::AiGenerated => "AI_GENERATED",
            Classification::Error => "ERROR",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label, score in [0, 1] and explanation for one clip. Lives for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub classification: Classification,
    pub score: f64,
    pub explanation: String,
}

impl ClassificationResult {
    /// The result reported when loading or feature extraction fails.
    pub fn error(cause: &anyhow::Error) -> Self {
        Self {
            classification: Classification::Error,
            score: 0.0,
            explanation: format!("Analysis Error: {:#}", cause),
        }
    }

    pub fn is_error(&self) -> bool {
        self.classification == Classification::Error
    }
}

/// Threshold classifier over the pulse variance.
#[derive(Debug, Clone)]
pub struct PulseClassifier {
    config: DetectionConfig,
}

impl PulseClassifier {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Apply the decision rule.
    ///
    /// - `variance > threshold` → HUMAN, score `min(cap, variance / divisor)` rounded to 2 decimals
    /// - otherwise → AI_GENERATED with the fixed score
    pub fn classify(&self, variance: f64) -> ClassificationResult {
        if variance > self.config.threshold {
            let raw = (variance / self.config.human_score_divisor).min(self.config.human_score_cap);
            ClassificationResult {
                classification: Classification::Human,
                score: round_to_hundredths(raw),
                explanation: HUMAN_EXPLANATION.to_string(),
            }
        } else {
            ClassificationResult {
                classification: Classification::AiGenerated,
                score: self.config.ai_score,
                explanation: AI_GENERATED_EXPLANATION.to_string(),
            }
        }
    }
}

impl Default for PulseClassifier {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

// Rounds from the exact binary value with ties to even, so 0.625 becomes 0.62.
fn round_to_hundredths(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
