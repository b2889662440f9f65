//! # Audio Processing Module
//!
//! Everything between "raw bytes arrived over HTTP" and "one scalar statistic".
//!
//! ## Key Components:
//! - **Staging**: Writes the decoded upload to a uniquely named file and guarantees its removal
//! - **Decoder**: Probes the container and decodes it to mono `f32` at the native sample rate
//! - **Onset**: Computes the onset-strength envelope and its variance
//!
//! ## Pipeline:
//! ```text
//! base64 bytes → StagedAudio (audio_<uuid>.<ext>) → decode_mono → onset_strength → variance
//! ```

pub mod decoder;   // Container probing and PCM decoding
pub mod onset;     // STFT, mel projection and spectral flux
pub mod staging;   // Temp file acquire/release

pub use decoder::decode_mono;
pub use onset::{onset_strength, variance, OnsetParams};
pub use staging::StagedAudio;
