//! # Application State Management
//!
//! State shared by every HTTP worker:
//!
//! - **config**: read once at startup, never mutated afterwards (`Arc<AppConfig>`)
//! - **analyzer**: the immutable PPT analyzer built from that config
//! - **metrics**: counters updated by every request (`Arc<RwLock<AppMetrics>>`)
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (each worker's `web::Data` holds a reference)
//! - **RwLock**: Many concurrent readers (health checks) or one writer (a finishing request)

use crate::config::AppConfig;
use crate::detection::{Classification, PulseAnalyzer};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub analyzer: Arc<PulseAnalyzer>,
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Requests that ended with a 4xx/5xx status
    pub error_count: u64,

    /// Analyses currently holding a staged file
    pub in_flight_analyses: u32,

    /// Outcomes of completed analyses
    pub classifications: ClassificationCounts,

    /// Per-route statistics, keyed by "METHOD /pattern"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassificationCounts {
    pub human: u64,
    pub ai_generated: u64,
    pub error: u64,
}

impl ClassificationCounts {
    pub fn total(&self) -> u64 {
        self.human + self.ai_generated + self.error
    }
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Keeps the in-flight gauge accurate: incremented on creation, decremented on drop.
#[derive(Debug)]
pub struct AnalysisTicket {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for AnalysisTicket {
    fn drop(&mut self) {
        let mut metrics = write_metrics(&self.metrics);
        metrics.in_flight_analyses = metrics.in_flight_analyses.saturating_sub(1);
    }
}

// A panic while holding the lock only ever interrupts a counter update, so the
// data behind a poisoned lock is still usable.
fn read_metrics(lock: &RwLock<AppMetrics>) -> RwLockReadGuard<'_, AppMetrics> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_metrics(lock: &RwLock<AppMetrics>) -> RwLockWriteGuard<'_, AppMetrics> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AppState {
    /// Create the shared state; the analyzer is built from the same config.
    pub fn new(config: AppConfig) -> Self {
        let analyzer = PulseAnalyzer::from_config(&config);
        Self {
            config: Arc::new(config),
            analyzer: Arc::new(analyzer),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn increment_request_count(&self) {
        write_metrics(&self.metrics).request_count += 1;
    }

    pub fn increment_error_count(&self) {
        write_metrics(&self.metrics).error_count += 1;
    }

    /// Record one finished request against its route.
    ///
    /// ## Parameters:
    /// - **endpoint**: "METHOD /pattern", e.g. "POST /api/voice-detection"
    /// - **duration_ms**: wall time spent in the service chain
    /// - **is_error**: whether the response status was 4xx/5xx
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = write_metrics(&self.metrics);
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark an analysis as started; it counts as in flight until the ticket is dropped.
    pub fn begin_analysis(&self) -> AnalysisTicket {
        write_metrics(&self.metrics).in_flight_analyses += 1;
        AnalysisTicket {
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn record_classification(&self, classification: Classification) {
        let mut metrics = write_metrics(&self.metrics);
        let counts = &mut metrics.classifications;
        match classification {
            Classification::Human => counts.human += 1,
            Classification::AiGenerated => counts.ai_generated += 1,
            Classification::Error => counts.error += 1,
        }
    }

    /// Copy of the current metrics, so no lock is held while serialising a response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        read_metrics(&self.metrics).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("POST /api/voice-detection", 120, false);
        state.record_endpoint_request("POST /api/voice-detection", 80, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /api/voice-detection"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 100.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_analysis_ticket_tracks_in_flight() {
        let state = AppState::new(AppConfig::default());

        let first = state.begin_analysis();
        let second = state.begin_analysis();
        assert_eq!(state.get_metrics_snapshot().in_flight_analyses, 2);

        drop(first);
        assert_eq!(state.get_metrics_snapshot().in_flight_analyses, 1);
        drop(second);
        assert_eq!(state.get_metrics_snapshot().in_flight_analyses, 0);
    }

    #[test]
    fn test_classification_counts() {
        let state = AppState::new(AppConfig::default());
        state.record_classification(Classification::Human);
        state.record_classification(Classification::AiGenerated);
        state.record_classification(Classification::AiGenerated);
        state.record_classification(Classification::Error);

        let counts = state.get_metrics_snapshot().classifications;
        assert_eq!(
            counts,
            ClassificationCounts {
                human: 1,
                ai_generated: 2,
                error: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }
}
