//! # Voice Detection Endpoint
//!
//! `POST /api/voice-detection` (behind `x-api-key`, 401 on mismatch)
//!
//! ## Request lifecycle:
//! 1. Deserialize `{language, audioFormat, audioBase64}` (400 on malformed JSON)
//! 2. Decode base64 (400 on failure, nothing touches the disk)
//! 3. Stage the bytes as `audio_<uuid>.<ext>`
//! 4. Run Prosodic Pulse Tracking on the blocking pool
//! 5. Release the staged file (its guard also removes it on every early exit)
//!
//! ## Response (200):
//! ```json
//! {
//!   "status": "success",
//!   "language": "English",
//!   "classification": "HUMAN",
//!   "confidenceScore": 0.87,
//!   "explanation": "Natural prosodic variance and organic speech pulses detected. [Guardian Mesh Protocol]"
//! }
//! ```
//! Analysis failures are also answered with 200: `{"status": "error", "message": "Analysis Error: ..."}`.

use crate::audio::StagedAudio;
use crate::detection::{Classification, ClassificationResult};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Appended to every successful explanation.
pub const PROTOCOL_TAG: &str = "[Guardian Mesh Protocol]";

/// Incoming detection request. Field names are camelCase on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRequest {
    pub language: String,
    pub audio_format: String,
    pub audio_base64: String,
}

/// Body of every 200 answer, tagged by `status`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DetectionResponse {
    Success {
        language: String,
        classification: Classification,
        #[serde(rename = "confidenceScore")]
        confidence_score: f64,
        explanation: String,
    },
    Error {
        message: String,
    },
}

impl DetectionResponse {
    pub fn from_result(language: String, result: ClassificationResult) -> Self {
        if result.is_error() {
            return DetectionResponse::Error {
                message: result.explanation,
            };
        }

        DetectionResponse::Success {
            language,
            classification: result.classification,
            confidence_score: result.score,
            explanation: format!("{} {}", result.explanation, PROTOCOL_TAG),
        }
    }
}

/// JSON extractor settings: base64 audio needs a far larger limit than actix's 32KB default,
/// and extractor failures should use the application's error body.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

/// Decode the payload, skipping ASCII whitespace so line-wrapped base64 is accepted.
pub fn decode_audio_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

pub async fn detect_voice(
    state: web::Data<AppState>,
    body: web::Json<VoiceRequest>,
) -> AppResult<HttpResponse> {
    let started = Instant::now();
    let VoiceRequest {
        language,
        audio_format,
        audio_base64,
    } = body.into_inner();

    let audio = decode_audio_base64(&audio_base64)?;
    drop(audio_base64);

    let staged = StagedAudio::stage(&state.config().analysis.staging_dir, &audio_format, &audio)
        .await
        .context("Failed to stage audio upload")?;
    drop(audio);

    let ticket = state.begin_analysis();
    let analyzer = state.analyzer.clone();
    let path = staged.path().to_path_buf();
    let outcome = web::block(move || analyzer.analyze(&path)).await;
    drop(ticket);

    let staged_bytes = staged.size_bytes();
    if let Err(err) = staged.release().await {
        warn!(error = %err, "Failed to release staged audio");
    }

    let result = outcome?;
    state.record_classification(result.classification);

    info!(
        language = %language,
        audio_format = %audio_format,
        staged_bytes,
        classification = %result.classification,
        score = result.score,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Voice detection finished"
    );

    Ok(HttpResponse::Ok().json(DetectionResponse::from_result(language, result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::handlers::configure_routes;
    use crate::middleware::API_KEY_HEADER;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;
    use std::io::Cursor;
    use std::path::Path;

    const KEY: &str = "test-key";

    fn test_state(staging_dir: &Path) -> AppState {
        let mut config = AppConfig::default();
        config.auth.api_key = KEY.to_string();
        config.analysis.staging_dir = staging_dir.to_path_buf();
        AppState::new(config)
    }

    fn wav_base64(samples: &[f32]) -> String {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for &s in samples {
                writer.write_sample((s * 32767.0) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        STANDARD.encode(bytes)
    }

    fn clicks() -> Vec<f32> {
        (0..48000)
            .map(|i| if i % 4000 == 2000 { 0.9 } else { 0.0 })
            .collect()
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    macro_rules! app {
        ($state:expr) => {{
            let state = $state;
            let config = state.config.clone();
            test::init_service(
                App::new()
                    .app_data(web::Data::new(state))
                    .configure(|cfg| configure_routes(cfg, &config)),
            )
            .await
        }};
    }

    fn detection_request(key: Option<&str>, body: serde_json::Value) -> test::TestRequest {
        let req = test::TestRequest::post().uri("/api/voice-detection").set_json(body);
        match key {
            Some(key) => req.insert_header((API_KEY_HEADER, key)),
            None => req,
        }
    }

    #[actix_web::test]
    async fn test_human_clip() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_state(dir.path()));

        let req = detection_request(
            Some(KEY),
            json!({"language": "English", "audioFormat": "wav", "audioBase64": wav_base64(&clicks())}),
        );
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["language"], "English");
        assert_eq!(body["classification"], "HUMAN");
        assert_eq!(body["confidenceScore"], 0.98);
        assert_eq!(
            body["explanation"],
            "Natural prosodic variance and organic speech pulses detected. [Guardian Mesh Protocol]"
        );
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[actix_web::test]
    async fn test_flat_clip_is_ai_generated() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_state(dir.path()));

        let req = detection_request(
            Some(KEY),
            json!({"language": "Tamil", "audioFormat": "wav", "audioBase64": wav_base64(&[0.0; 16000])}),
        );
        let body: serde_json::Value = test::call_and_read_body_json(&app, req.to_request()).await;

        assert_eq!(body["status"], "success");
        assert_eq!(body["classification"], "AI_GENERATED");
        assert_eq!(body["confidenceScore"], 0.96);
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[actix_web::test]
    async fn test_bad_key_never_reaches_staging() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_state(dir.path()));
        let body = json!({"language": "English", "audioFormat": "wav", "audioBase64": wav_base64(&clicks())});

        let wrong = test::call_service(&app, detection_request(Some("guess"), body.clone()).to_request()).await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let missing = test::call_service(&app, detection_request(None, body).to_request()).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        // Rejected before the body is even parsed
        let garbage = test::TestRequest::post()
            .uri("/api/voice-detection")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        assert_eq!(test::call_service(&app, garbage).await.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(staged_files(dir.path()), 0);
    }

    #[actix_web::test]
    async fn test_invalid_base64_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_state(dir.path()));

        let req = detection_request(
            Some(KEY),
            json!({"language": "English", "audioFormat": "mp3", "audioBase64": "@@not base64@@"}),
        );
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "bad_request");
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[actix_web::test]
    async fn test_line_wrapped_base64_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_state(dir.path()));

        let encoded = wav_base64(&clicks());
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains('\n'));

        let req = detection_request(
            Some(KEY),
            json!({"language": "English", "audioFormat": "wav", "audioBase64": wrapped}),
        );
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["classification"], "HUMAN");
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[actix_web::test]
    async fn test_wrapped_decode_matches_unwrapped() {
        let payload: Vec<u8> = (0..120u8).collect();
        let encoded = STANDARD.encode(&payload);
        let wrapped = format!("{}\n{}\n", &encoded[..76], &encoded[76..]);

        assert_eq!(decode_audio_base64(&wrapped).unwrap(), payload);
        assert!(decode_audio_base64("@@not base64@@").is_err());
    }

    #[actix_web::test]
    async fn test_missing_field_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_state(dir.path()));

        let req = detection_request(Some(KEY), json!({"language": "English", "audioFormat": "mp3"}));
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_undecodable_audio_reports_error_in_body() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let metrics = state.metrics.clone();
        let app = app!(state);

        let req = detection_request(
            Some(KEY),
            json!({
                "language": "English",
                "audioFormat": "mp3",
                "audioBase64": STANDARD.encode(b"plain text pretending to be an mp3")
            }),
        );
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().starts_with("Analysis Error:"));
        assert!(body.get("classification").is_none());

        assert_eq!(staged_files(dir.path()), 0);
        let snapshot = metrics.read().unwrap().clone();
        assert_eq!(snapshot.classifications.error, 1);
        assert_eq!(snapshot.in_flight_analyses, 0);
    }

    #[actix_web::test]
    async fn test_concurrent_requests_leave_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_state(dir.path()));

        let requests = (0..8).map(|i| {
            let samples = if i % 2 == 0 { clicks() } else { vec![0.0; 16000] };
            let req = detection_request(
                Some(KEY),
                json!({"language": "English", "audioFormat": "wav", "audioBase64": wav_base64(&samples)}),
            );
            test::call_service(&app, req.to_request())
        });
        let responses = futures_util::future::join_all(requests).await;

        for (i, resp) in responses.into_iter().enumerate() {
            assert_eq!(resp.status(), StatusCode::OK);
            let body: serde_json::Value = test::read_body_json(resp).await;
            let expected = if i % 2 == 0 { "HUMAN" } else { "AI_GENERATED" };
            assert_eq!(body["classification"], expected);
        }
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[actix_web::test]
    async fn test_request_uses_camel_case() {
        let request: VoiceRequest = serde_json::from_str(
            r#"{"language": "Hindi", "audioFormat": "mp3", "audioBase64": "SUQz"}"#,
        )
        .unwrap();
        assert_eq!(request.language, "Hindi");
        assert_eq!(request.audio_format, "mp3");
        assert_eq!(request.audio_base64, "SUQz");
    }

    #[actix_web::test]
    async fn test_error_response_shape() {
        let response = DetectionResponse::from_result(
            "English".to_string(),
            ClassificationResult::error(&anyhow::anyhow!("Unrecognised audio container")),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": "error", "message": "Analysis Error: Unrecognised audio container"})
        );
    }
}
