//! Observability infrastructure for the detector
//!
//! Provides:
//! - Prometheus metrics (inference latency, predictions by class, model loads, dataset size)
//! - Structured JSON logging with tracing

use crate::models::{BotnetAlert, DetectionSummary, ModelKind, PredictionRecord};
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    inference_latency_seconds: HistogramVec,
    predictions: IntCounterVec,
    prediction_errors: IntCounterVec,
    model_loads: IntCounterVec,
    models_loaded: IntGaugeVec,
    dataset_rows: IntGauge,
    alerts_sent: IntCounter,
    events_dropped: IntCounter,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            inference_latency_seconds: register_histogram_vec!(
                "botnet_detector_inference_latency_seconds",
                "Time spent scoring a request, by model",
                &["model"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            predictions: register_int_counter_vec!(
                "botnet_detector_predictions_total",
                "Predictions produced, by model and class",
                &["model", "class"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "botnet_detector_prediction_errors_total",
                "Failed predictions, by model",
                &["model"]
            )
            .expect("Failed to register prediction_errors_total"),

            model_loads: register_int_counter_vec!(
                "botnet_detector_model_loads_total",
                "Artifact load attempts, by model and outcome",
                &["model", "outcome"]
            )
            .expect("Failed to register model_loads_total"),

            models_loaded: register_int_gauge_vec!(
                "botnet_detector_model_loaded",
                "Whether a model artifact is resident (1) or not (0)",
                &["model"]
            )
            .expect("Failed to register model_loaded"),

            dataset_rows: register_int_gauge!(
                "botnet_detector_dataset_rows",
                "Rows in the loaded reference dataset"
            )
            .expect("Failed to register dataset_rows"),

            alerts_sent: register_int_counter!(
                "botnet_detector_alerts_total",
                "Botnet alerts raised during live monitoring"
            )
            .expect("Failed to register alerts_total"),

            events_dropped: register_int_counter!(
                "botnet_detector_events_dropped_total",
                "Outbound events dropped because the sink was full or closed"
            )
            .expect("Failed to register events_dropped_total"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_inference_latency(&self, kind: ModelKind, duration_secs: f64) {
        self.inner()
            .inference_latency_seconds
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs);
    }

    pub fn inc_prediction(&self, kind: ModelKind, class: u8) {
        self.inner()
            .predictions
            .with_label_values(&[kind.as_str(), crate::models::class_label(class)])
            .inc();
    }

    pub fn inc_prediction_error(&self, kind: ModelKind) {
        self.inner()
            .prediction_errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Record a load attempt and update the resident gauge
    pub fn record_model_load(&self, kind: ModelKind, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner()
            .model_loads
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
        if success {
            self.inner()
                .models_loaded
                .with_label_values(&[kind.as_str()])
                .set(1);
        }
    }

    pub fn model_loads(&self, kind: ModelKind, success: bool) -> u64 {
        let outcome = if success { "success" } else { "failure" };
        self.inner()
            .model_loads
            .with_label_values(&[kind.as_str(), outcome])
            .get()
    }

    pub fn set_dataset_rows(&self, rows: i64) {
        self.inner().dataset_rows.set(rows);
    }

    pub fn inc_alerts(&self) {
        self.inner().alerts_sent.inc();
    }

    pub fn inc_events_dropped(&self) {
        self.inner().events_dropped.inc();
    }
}

/// Structured logger for detector events
///
/// Consistent JSON-formatted records for predictions, model loads, run
/// summaries and alerts.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Log a persisted prediction record
    pub fn log_prediction(&self, record: &PredictionRecord) {
        info!(
            event = "prediction_generated",
            service = %self.service,
            requested_by = %record.requested_by,
            model = %record.model,
            prediction = record.prediction,
            probability = record.probability,
            confidence = record.confidence,
            actual_label = ?record.actual_label,
            timestamp = record.timestamp,
            "Prediction recorded"
        );
    }

    pub fn log_model_loaded(&self, kind: ModelKind, version: &str, elapsed_ms: u128) {
        info!(
            event = "model_loaded",
            service = %self.service,
            model = %kind,
            version = %version,
            elapsed_ms = elapsed_ms,
            "Model artifact loaded"
        );
    }

    pub fn log_model_load_failed(&self, kind: ModelKind, error: &str) {
        warn!(
            event = "model_load_failed",
            service = %self.service,
            model = %kind,
            error = %error,
            "Model artifact failed to load; next request will retry"
        );
    }

    /// Log the summary of a batch or monitoring run
    pub fn log_run_summary(&self, summary: &DetectionSummary) {
        info!(
            event = "run_summary",
            service = %self.service,
            run = ?summary.run,
            requested_by = %summary.requested_by,
            model = %summary.model,
            total_samples = summary.total_samples,
            botnet_detected = summary.botnet_detected,
            normal_detected = summary.normal_detected,
            failed = summary.failed,
            accuracy = ?summary.accuracy,
            detection_rate = summary.detection_rate,
            "Detection run completed"
        );
    }

    pub fn log_alert(&self, alert: &BotnetAlert) {
        warn!(
            event = "botnet_alert",
            service = %self.service,
            requested_by = %alert.requested_by,
            sample_id = alert.sample_id,
            model = %alert.model,
            probability = alert.probability,
            confidence = alert.confidence,
            detected_at = %alert.timestamp,
            "Botnet traffic detected"
        );
    }

    pub fn log_startup(&self, version: &str, model_dir: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            model_dir = %model_dir,
            "Botnet detector started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Botnet detector shutting down"
        );
    }
}
