//! # Voice Detection
//!
//! Prosodic Pulse Tracking (PPT): the variance of the onset-strength envelope
//! is used as a human versus AI-generated speech discriminator.
//!
//! - **analyzer**: staged file → `PulseMeasurement` → `ClassificationResult`
//! - **classifier**: the threshold rule and the wire labels

pub mod analyzer;
pub mod classifier;

pub use analyzer::PulseAnalyzer;
pub use classifier::{Classification, ClassificationResult};
