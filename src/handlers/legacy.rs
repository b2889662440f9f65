//! Minimal VoxCore surface kept for existing clients.
//!
//! - `GET /` answers with an online message
//! - `POST /detect` (behind `x-api-key`, 403 on mismatch) accepts a multipart
//!   upload in the `file` field and always answers with a stub. It performs
//!   no detection.

use crate::error::{AppError, AppResult};
use actix_multipart::{Field, Multipart};
use actix_web::HttpResponse;
use futures_util::stream::StreamExt;
use serde_json::json;
use tracing::debug;

pub async fn home() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "VoxCore API is Online. Visit /docs to test."
    }))
}

pub async fn detect_stub(mut payload: Multipart) -> AppResult<HttpResponse> {
    let mut received: Option<(String, usize)> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field = item.map_err(|e| AppError::ValidationError(format!("Multipart error: {}", e)))?;

        let (field_name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().unwrap_or_default().to_string(),
                disposition.get_filename().unwrap_or("unknown").to_string(),
            ),
            None => continue,
        };

        // Drain every field so the connection stays usable; only `file` is counted.
        let mut size = 0usize;
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::ValidationError(format!("Chunk error: {}", e)))?;
            size += chunk.len();
        }

        if field_name == "file" {
            received = Some((filename, size));
        }
    }

    let (filename, size) = received
        .ok_or_else(|| AppError::ValidationError("No file provided in field 'file'".to_string()))?;
    debug!(filename = %filename, size_bytes = size, "Discarded upload on stub detect endpoint");

    Ok(HttpResponse::Ok().json(json!({
        "status": "Success",
        "classification": "Human"
    })))
}
