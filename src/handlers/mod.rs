pub mod detection;
pub mod legacy;

pub use detection::*;
pub use legacy::*;

use crate::config::AppConfig;
use crate::health;
use crate::middleware::ApiKeyGuard;
use actix_web::web;

/// Register every route. Shared by the server and the handler tests.
///
/// The API key guards wrap individual resources, so health and home stay public.
pub fn configure_routes(cfg: &mut web::ServiceConfig, config: &AppConfig) {
    let api_key = config.auth.api_key.as_str();

    cfg.app_data(json_config(config.server.max_payload_bytes))
        .service(
            web::resource("/api/voice-detection")
                .wrap(ApiKeyGuard::unauthorized(api_key))
                .route(web::post().to(detect_voice)),
        )
        .service(
            web::resource("/detect")
                .wrap(ApiKeyGuard::forbidden(api_key))
                .route(web::post().to(detect_stub)),
        )
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics)),
        )
        .route("/health", web::get().to(health::health_check))
        .route("/", web::get().to(home));
}
