//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between nested keys)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables (`HOST`, `PORT`, `API_KEY`)
//! 2. Environment variables (APP_SERVER__PORT, APP_DETECTION__THRESHOLD, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The configuration is read exactly once at startup and then shared read-only
//! with every request handler through `AppState`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Shared secret used when neither `config.toml` nor the environment provides one.
///
/// A real deployment must never rely on this value; startup logs a warning when it is active.
pub const FALLBACK_API_KEY: &str = "Sathvika_Guardian_2026";

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, auth, detection, analysis)
/// keeps each concern independently overridable from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub detection: DetectionConfig,
    pub analysis: AnalysisConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on
/// - `workers`: Number of HTTP worker threads (0 lets actix pick one per core)
/// - `max_payload_bytes`: Largest JSON body accepted; base64 audio is about 4/3 of the raw clip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_payload_bytes: usize,
}

/// Shared-secret gate settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub api_key: String,
}

// Keeps the secret out of `{:?}` output, including the startup config dump.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Decision parameters for Prosodic Pulse Tracking.
///
/// ## Decision rule:
/// - `variance > threshold` → HUMAN with score `min(human_score_cap, variance / human_score_divisor)`
/// - otherwise → AI_GENERATED with the fixed `ai_score`
///
/// These are demonstration values with no empirical grounding; they are kept
/// configurable so they can be tuned without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub threshold: f64,
    pub human_score_cap: f64,
    pub human_score_divisor: f64,
    pub ai_score: f64,
}

/// Onset-strength extraction and staging settings.
///
/// ## Fields:
/// - `n_fft`: STFT window length in samples
/// - `hop_length`: Samples between successive STFT frames
/// - `n_mels`: Number of mel bands the power spectrum is projected onto
/// - `top_db`: Dynamic range kept when converting power to decibels
/// - `staging_dir`: Directory where decoded uploads are written during analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub top_db: f32,
    pub staging_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                workers: 0,
                max_payload_bytes: 25 * 1024 * 1024,  // 25MB of JSON
            },
            auth: AuthConfig {
                api_key: FALLBACK_API_KEY.to_string(),
            },
            detection: DetectionConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 1.2,
            human_score_cap: 0.98,
            human_score_divisor: 2.0,
            ai_score: 0.96,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: 80.0,
            staging_dir: env::temp_dir().join("guardian-mesh"),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle the platform variables HOST, PORT and API_KEY
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_DETECTION__THRESHOLD=1.5`: Override the PPT decision threshold
    /// - `APP_ANALYSIS__STAGING_DIR=/var/tmp/voice`: Move staged uploads
    /// - `API_KEY=...`: Shared secret expected in the `x-api-key` header
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore separates sections so that field names like
            // `max_payload_bytes` survive intact.
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("API_KEY") {
            settings = settings.set_override("auth.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 and the payload limit is non-zero
    /// - The API key is not empty
    /// - Scores lie in [0, 1] and the score divisor is positive
    /// - STFT parameters are usable (non-zero, hop no longer than the window)
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_payload_bytes == 0 {
            return Err(anyhow::anyhow!("Max payload size must be greater than 0"));
        }

        if self.auth.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("API key cannot be empty"));
        }

        let detection = &self.detection;
        if !detection.threshold.is_finite() {
            return Err(anyhow::anyhow!("Detection threshold must be a finite number"));
        }

        if !(detection.human_score_divisor.is_finite() && detection.human_score_divisor > 0.0) {
            return Err(anyhow::anyhow!("Human score divisor must be greater than 0"));
        }

        for (name, score) in [
            ("human_score_cap", detection.human_score_cap),
            ("ai_score", detection.ai_score),
        ] {
            if !(0.0..=1.0).contains(&score) {
                return Err(anyhow::anyhow!("{} must be within [0, 1], got {}", name, score));
            }
        }

        let analysis = &self.analysis;
        if analysis.n_fft == 0 || analysis.hop_length == 0 || analysis.n_mels == 0 {
            return Err(anyhow::anyhow!("n_fft, hop_length and n_mels must be greater than 0"));
        }

        if analysis.hop_length > analysis.n_fft {
            return Err(anyhow::anyhow!(
                "hop_length ({}) cannot exceed n_fft ({})",
                analysis.hop_length,
                analysis.n_fft
            ));
        }

        if !(analysis.top_db.is_finite() && analysis.top_db > 0.0) {
            return Err(anyhow::anyhow!("top_db must be greater than 0"));
        }

        Ok(())
    }

    /// Whether the process is running with the hardcoded fallback secret.
    pub fn uses_fallback_key(&self) -> bool {
        self.auth.api_key == FALLBACK_API_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.detection.threshold, 1.2);
        assert_eq!(config.detection.ai_score, 0.96);
        assert_eq!(config.analysis.n_fft, 2048);
        assert_eq!(config.analysis.hop_length, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.detection.human_score_divisor = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.detection.ai_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.hop_length = 4096;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.api_key = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_key_detection() {
        let mut config = AppConfig::default();
        assert!(config.uses_fallback_key());

        config.auth.api_key = "rotated-secret".to_string();
        assert!(!config.uses_fallback_key());
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let mut config = AppConfig::default();
        config.auth.api_key = "super-secret-value".to_string();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
