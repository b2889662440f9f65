pub mod auth;
pub mod metrics;

pub use auth::{ApiKeyGuard, API_KEY_HEADER};
pub use metrics::MetricsMiddleware;
